//! Batch planning.
//!
//! Splits a record sequence into contiguous, fixed-size [`Batch`]es and
//! assigns each one the catalog page it is reconciled against. Batch `i`
//! (0-indexed) is compared with page `start_page + i`, fetched with a page
//! size equal to the batch size, so record offsets and catalog offsets line
//! up.
//!
//! # Example
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use catalog_reconcile_core::batch::plan_batches;
//!
//! let batches = plan_batches(7, NonZeroUsize::new(3).unwrap(), 1).unwrap();
//! assert_eq!(batches.len(), 3);
//! assert_eq!(batches[2].start, 6);
//! assert_eq!(batches[2].end, 7);
//! assert_eq!(batches[2].page, 3);
//! ```

use std::num::NonZeroUsize;
use std::ops::Range;

use serde::Serialize;
use thiserror::Error;

/// A plan that cannot be expressed in catalog page numbers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("batch {index} would need a catalog page past u32::MAX (start page {start_page})")]
    PageOverflow { start_page: u32, index: usize },
}

/// A contiguous slice of the record sequence bound to one catalog page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Batch {
    /// Position of this batch in the plan (0-indexed).
    pub index: usize,
    /// Offset of the first record (inclusive).
    pub start: usize,
    /// Offset past the last record (exclusive).
    pub end: usize,
    /// Catalog page assigned to this batch.
    pub page: u32,
    /// Page size requested from the catalog. Equal to the planned batch
    /// size, including for a shorter final batch.
    pub page_size: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Slices this batch's records out of the full sequence.
    ///
    /// Panics if `all` is shorter than the sequence the plan was built for.
    pub fn records<'a, T>(&self, all: &'a [T]) -> &'a [T] {
        &all[self.range()]
    }
}

/// Partitions `total` records into batches of `batch_size`.
///
/// # Guarantees
///
/// - Exactly `ceil(total / batch_size)` batches; zero records yield none.
/// - Batches are contiguous and exhaustive: `batches[i].end == batches[i + 1].start`,
///   the first starts at 0 and the last ends at `total`.
/// - Only the final batch may be shorter than `batch_size`.
/// - Pages are `start_page, start_page + 1, …` with no gaps.
///
/// Fails with [`PlanError::PageOverflow`] when the last page number would
/// not fit in a `u32`.
pub fn plan_batches(
    total: usize,
    batch_size: NonZeroUsize,
    start_page: u32,
) -> Result<Vec<Batch>, PlanError> {
    let size = batch_size.get();
    let count = total.div_ceil(size);

    (0..count)
        .map(|index| {
            let page = u32::try_from(index)
                .ok()
                .and_then(|offset| start_page.checked_add(offset))
                .ok_or(PlanError::PageOverflow { start_page, index })?;
            let start = index * size;
            Ok(Batch {
                index,
                start,
                end: (start + size).min(total),
                page,
                page_size: size,
            })
        })
        .collect()
}
