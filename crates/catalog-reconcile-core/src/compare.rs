//! Field-level comparison of a record batch against one catalog page.
//!
//! # Algorithm
//!
//! 1. Index the page's products by `id`. Duplicate ids keep the last entry.
//! 2. For each record, in input order:
//!    - id missing from the page → one `existence` difference `(true, false)`;
//!    - otherwise compare name, category, price, stock, supplier in that
//!      order with exact equality, collecting one difference per mismatch.
//! 3. Records with no differences produce no [`Divergence`].
//!
//! Values are compared as-is: no trimming, case folding, or float
//! tolerance. A price of `0.1 + 0.2` in the CSV and `0.3` in the catalog is a
//! divergence.

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{CatalogPage, Divergence, ExternalProduct, Field, FieldDifference, Record};

/// Failure raised by a [`Comparator`] that cannot reason about a page.
///
/// [`FieldComparator`] never returns it; empty pages degrade into
/// `existence` divergences instead.
#[derive(Debug, Error)]
pub enum ComparisonError {
    #[error("malformed catalog page: {0}")]
    MalformedPage(String),
}

/// Produces the divergences for one batch.
///
/// Implementations must be pure with respect to their inputs so dispatchers
/// can call them from any worker.
pub trait Comparator: Send + Sync {
    fn compare(
        &self,
        records: &[Record],
        page: &CatalogPage,
    ) -> Result<Vec<Divergence>, ComparisonError>;
}

/// The default exact-equality comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldComparator;

impl Comparator for FieldComparator {
    fn compare(
        &self,
        records: &[Record],
        page: &CatalogPage,
    ) -> Result<Vec<Divergence>, ComparisonError> {
        Ok(compare_batch(records, page))
    }
}

/// Compares `records` against `page`, returning divergences in input order.
pub fn compare_batch(records: &[Record], page: &CatalogPage) -> Vec<Divergence> {
    let lookup: HashMap<i64, &ExternalProduct> = page.data.iter().map(|p| (p.id, p)).collect();

    records
        .iter()
        .filter_map(|record| {
            let differences = match lookup.get(&record.id) {
                Some(product) => field_differences(record, product),
                None => vec![FieldDifference::missing_from_catalog()],
            };
            if differences.is_empty() {
                None
            } else {
                Some(Divergence {
                    record_id: record.id,
                    differences,
                })
            }
        })
        .collect()
}

/// Lists the mismatched fields of a matched pair in fixed field order.
pub fn field_differences(record: &Record, product: &ExternalProduct) -> Vec<FieldDifference> {
    let mut diffs = Vec::new();

    if record.name != product.name {
        diffs.push(FieldDifference::new(
            Field::Name,
            record.name.as_str(),
            product.name.as_str(),
        ));
    }
    if record.category != product.category {
        diffs.push(FieldDifference::new(
            Field::Category,
            record.category.as_str(),
            product.category.as_str(),
        ));
    }
    if record.price != product.price {
        diffs.push(FieldDifference::new(Field::Price, record.price, product.price));
    }
    if record.stock != product.stock {
        diffs.push(FieldDifference::new(Field::Stock, record.stock, product.stock));
    }
    if record.supplier != product.supplier {
        diffs.push(FieldDifference::new(
            Field::Supplier,
            record.supplier.as_str(),
            product.supplier.as_str(),
        ));
    }

    diffs
}
