//! Batch dispatch policies.
//!
//! A [`Dispatcher`] drives fetch → compare for every planned [`Batch`] and
//! aggregates the divergences. Two policies share the same fetcher,
//! comparator, and inputs:
//!
//! | Policy | Scheduling | On a batch failure | Result order |
//! |--------|------------|--------------------|--------------|
//! | [`run_concurrent`](Dispatcher::run_concurrent) | tokio tasks, at most `max_in_flight` at once | logged, batch dropped, listed in [`DispatchReport::failed_batches`] | arrival order |
//! | [`run_sequential`](Dispatcher::run_sequential) | one batch at a time | whole run aborts with [`DispatchError`] | batch order |
//!
//! Neither policy cancels in-flight work or applies a deadline of its own;
//! the only time bound is whatever the fetcher enforces per request.
//!
//! # Logging
//!
//! The dispatcher owns a [`tracing::Dispatch`] and runs every batch future
//! under it, so the fetcher and comparator log to the same place without
//! touching the global subscriber.

use std::num::NonZeroUsize;
use std::sync::Arc;

use catalog_reconcile_core::batch::Batch;
use catalog_reconcile_core::compare::{Comparator, ComparisonError, FieldComparator};
use catalog_reconcile_core::fetch::{CatalogFetcher, FetchError};
use catalog_reconcile_core::models::{Divergence, Record};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, Dispatch};

/// Which dispatch policy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPolicy {
    Concurrent,
    Sequential,
}

/// Why a single batch failed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Compare(#[from] ComparisonError),
    #[error("batch task panicked: {0}")]
    Panicked(String),
}

impl BatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            BatchError::Fetch(e) => e.kind(),
            BatchError::Compare(_) => "comparison",
            BatchError::Panicked(_) => "panicked",
        }
    }
}

/// The sequential policy's abort error: the first failing batch.
#[derive(Debug, Error)]
#[error("batch {} (page {page}) failed: {source}", .batch_index + 1)]
pub struct DispatchError {
    pub batch_index: usize,
    pub page: u32,
    #[source]
    pub source: BatchError,
}

/// A batch the concurrent policy dropped from its aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub page: u32,
    pub kind: String,
    pub reason: String,
}

impl BatchFailure {
    fn new(batch: &Batch, err: &BatchError) -> Self {
        Self {
            batch_index: batch.index,
            page: batch.page,
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Aggregate output of a dispatch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub divergences: Vec<Divergence>,
    pub failed_batches: Vec<BatchFailure>,
}

impl DispatchReport {
    /// True when every batch contributed to the aggregate.
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

/// Runs batches against a fetcher and comparator under a chosen policy.
#[derive(Clone)]
pub struct Dispatcher {
    fetcher: Arc<dyn CatalogFetcher>,
    comparator: Arc<dyn Comparator>,
    logger: Dispatch,
}

impl Dispatcher {
    pub fn new(
        fetcher: Arc<dyn CatalogFetcher>,
        comparator: Arc<dyn Comparator>,
        logger: Dispatch,
    ) -> Self {
        Self {
            fetcher,
            comparator,
            logger,
        }
    }

    /// A dispatcher using the exact-equality [`FieldComparator`].
    pub fn with_field_comparator(fetcher: Arc<dyn CatalogFetcher>, logger: Dispatch) -> Self {
        Self::new(fetcher, Arc::new(FieldComparator), logger)
    }

    pub fn logger(&self) -> &Dispatch {
        &self.logger
    }

    /// Runs `batches` under `policy`.
    ///
    /// The concurrent policy always returns `Ok`; only the sequential policy
    /// produces a [`DispatchError`].
    pub async fn run(
        &self,
        policy: DispatchPolicy,
        records: Arc<[Record]>,
        batches: &[Batch],
        max_in_flight: NonZeroUsize,
    ) -> Result<DispatchReport, DispatchError> {
        match policy {
            DispatchPolicy::Concurrent => {
                Ok(self.run_concurrent(records, batches, max_in_flight).await)
            }
            DispatchPolicy::Sequential => {
                let divergences = self.run_sequential(&records, batches).await?;
                Ok(DispatchReport {
                    divergences,
                    failed_batches: Vec::new(),
                })
            }
        }
    }

    /// Bounded-concurrency policy.
    ///
    /// A permit is taken from a `max_in_flight` semaphore before each batch
    /// task is spawned and released when the task ends, so no more than
    /// `max_in_flight` fetches are ever outstanding. Tasks publish their
    /// outcome on a channel that is drained after every task has been
    /// joined. Failed batches are logged and left out of `divergences`;
    /// sibling batches are unaffected.
    pub async fn run_concurrent(
        &self,
        records: Arc<[Record]>,
        batches: &[Batch],
        max_in_flight: NonZeroUsize,
    ) -> DispatchReport {
        let logger = self.logger.clone();
        self.concurrent_inner(records, batches, max_in_flight)
            .with_subscriber(logger)
            .await
    }

    async fn concurrent_inner(
        &self,
        records: Arc<[Record]>,
        batches: &[Batch],
        max_in_flight: NonZeroUsize,
    ) -> DispatchReport {
        let total = batches.len();
        let semaphore = Arc::new(Semaphore::new(max_in_flight.get()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(total);

        for batch in batches.iter().copied() {
            // The semaphore is never closed.
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            let fetcher = Arc::clone(&self.fetcher);
            let comparator = Arc::clone(&self.comparator);
            let records = Arc::clone(&records);
            let tx = tx.clone();

            let task = async move {
                let outcome = run_batch(
                    fetcher.as_ref(),
                    comparator.as_ref(),
                    batch.records(&records[..]),
                    &batch,
                    total,
                )
                .await;
                drop(permit);

                if let Err(e) = &outcome {
                    error!(
                        batch = batch.index + 1,
                        page = batch.page,
                        kind = e.kind(),
                        "Error processing batch {}: {}",
                        batch.index + 1,
                        e
                    );
                }
                let _ = tx.send((batch, outcome));
            };
            handles.push((batch, tokio::spawn(task.with_subscriber(self.logger.clone()))));
        }
        drop(tx);

        let mut report = DispatchReport::default();

        for (batch, handle) in handles {
            if let Err(join_err) = handle.await {
                let err = BatchError::Panicked(join_err.to_string());
                error!(
                    batch = batch.index + 1,
                    page = batch.page,
                    "Batch task {} did not complete: {}",
                    batch.index + 1,
                    err
                );
                report.failed_batches.push(BatchFailure::new(&batch, &err));
            }
        }

        while let Some((batch, outcome)) = rx.recv().await {
            match outcome {
                Ok(divergences) => report.divergences.extend(divergences),
                Err(err) => report.failed_batches.push(BatchFailure::new(&batch, &err)),
            }
        }

        report
            .failed_batches
            .sort_by_key(|failure| failure.batch_index);

        info!(
            batches = total,
            divergences = report.divergences.len(),
            failed = report.failed_batches.len(),
            "Completed all {} batches, found {} divergences",
            total,
            report.divergences.len()
        );
        report
    }

    /// Strictly sequential, fail-fast policy.
    ///
    /// Batches run one at a time in plan order. The first failure aborts the
    /// run: later batches are never fetched and no partial list is returned.
    pub async fn run_sequential(
        &self,
        records: &[Record],
        batches: &[Batch],
    ) -> Result<Vec<Divergence>, DispatchError> {
        let logger = self.logger.clone();
        self.sequential_inner(records, batches)
            .with_subscriber(logger)
            .await
    }

    async fn sequential_inner(
        &self,
        records: &[Record],
        batches: &[Batch],
    ) -> Result<Vec<Divergence>, DispatchError> {
        let total = batches.len();
        let mut all = Vec::new();

        for batch in batches {
            let outcome = run_batch(
                self.fetcher.as_ref(),
                self.comparator.as_ref(),
                batch.records(records),
                batch,
                total,
            )
            .await;

            match outcome {
                Ok(divergences) => all.extend(divergences),
                Err(source) => {
                    error!(
                        batch = batch.index + 1,
                        page = batch.page,
                        kind = source.kind(),
                        "Aborting at batch {}/{}: {}",
                        batch.index + 1,
                        total,
                        source
                    );
                    return Err(DispatchError {
                        batch_index: batch.index,
                        page: batch.page,
                        source,
                    });
                }
            }
        }

        info!(
            batches = total,
            divergences = all.len(),
            "Completed all {} batches, found {} divergences",
            total,
            all.len()
        );
        Ok(all)
    }
}

/// Fetches the batch's page and compares it. Shared by both policies.
async fn run_batch(
    fetcher: &dyn CatalogFetcher,
    comparator: &dyn Comparator,
    records: &[Record],
    batch: &Batch,
    total: usize,
) -> Result<Vec<Divergence>, BatchError> {
    info!(
        batch = batch.index + 1,
        page = batch.page,
        "Processing batch {}/{} (records {}-{})",
        batch.index + 1,
        total,
        batch.start + 1,
        batch.end
    );

    let page = fetcher.fetch_page(batch.page, batch.page_size).await?;
    let divergences = comparator.compare(records, &page)?;

    debug!(
        batch = batch.index + 1,
        fetched = page.data.len(),
        divergences = divergences.len(),
        "Batch compared"
    );
    Ok(divergences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalog_reconcile_core::batch::plan_batches;
    use catalog_reconcile_core::models::{CatalogPage, ExternalProduct, Field};
    use std::collections::{HashMap, HashSet};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct StubCatalog {
        pages: HashMap<u32, CatalogPage>,
        failing: HashSet<u32>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<u32>>,
    }

    impl StubCatalog {
        fn new(pages: HashMap<u32, CatalogPage>) -> Self {
            Self {
                pages,
                failing: HashSet::new(),
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, page: u32) -> Self {
            self.failing.insert(page);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CatalogFetcher for StubCatalog {
        async fn fetch_page(&self, page: u32, _limit: usize) -> Result<CatalogPage, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(page);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&page) {
                return Err(FetchError::BadStatus {
                    code: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(self.pages.get(&page).cloned().unwrap_or_default())
        }
    }

    struct RejectingComparator;

    impl Comparator for RejectingComparator {
        fn compare(
            &self,
            _records: &[Record],
            _page: &CatalogPage,
        ) -> Result<Vec<Divergence>, ComparisonError> {
            Err(ComparisonError::MalformedPage("no pagination".to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    fn capturing_logger() -> (Dispatch, CapturedLogs) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (Dispatch::new(subscriber), logs)
    }

    fn record(id: i64) -> Record {
        Record {
            id,
            name: format!("Item {}", id),
            category: "Office".to_string(),
            price: 2.5,
            stock: 100,
            supplier: "Initech".to_string(),
        }
    }

    fn product(r: &Record) -> ExternalProduct {
        ExternalProduct {
            id: r.id,
            name: r.name.clone(),
            category: r.category.clone(),
            price: r.price,
            stock: r.stock,
            supplier: r.supplier.clone(),
        }
    }

    /// Six records in three batches of two (pages 1-3).
    /// Page 1: record 2 has a stock mismatch. Page 3: record 6 is missing.
    fn three_batch_fixture() -> (Arc<[Record]>, Vec<Batch>, HashMap<u32, CatalogPage>) {
        let records: Vec<Record> = (1..=6).map(record).collect();

        let mut p2 = product(&records[1]);
        p2.stock = 7;
        let page1 = CatalogPage::from_products(1, 2, vec![product(&records[0]), p2]);
        let page2 = CatalogPage::from_products(2, 2, records[2..4].iter().map(product).collect());
        let page3 = CatalogPage::from_products(3, 2, vec![product(&records[4])]);

        let pages = HashMap::from([(1, page1), (2, page2), (3, page3)]);
        let batches = plan_batches(records.len(), NonZeroUsize::new(2).unwrap(), 1).unwrap();
        (records.into(), batches, pages)
    }

    fn in_flight(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn sorted_ids(divs: &[Divergence]) -> Vec<i64> {
        let mut ids: Vec<i64> = divs.iter().map(|d| d.record_id).collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test]
    async fn test_concurrent_collects_all_batches() {
        let (records, batches, pages) = three_batch_fixture();
        let dispatcher =
            Dispatcher::with_field_comparator(Arc::new(StubCatalog::new(pages)), Dispatch::none());

        let report = dispatcher
            .run_concurrent(records, &batches, in_flight(4))
            .await;
        assert!(report.is_complete());
        assert_eq!(sorted_ids(&report.divergences), vec![2, 6]);

        let missing = report.divergences.iter().find(|d| d.record_id == 6).unwrap();
        assert!(missing.is_missing());
        let stock = report.divergences.iter().find(|d| d.record_id == 2).unwrap();
        assert_eq!(stock.differences[0].field_name, Field::Stock);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_drops_failed_batch_and_succeeds() {
        let (records, batches, pages) = three_batch_fixture();
        let fetcher = Arc::new(StubCatalog::new(pages).failing_on(2));
        let dispatcher = Dispatcher::with_field_comparator(fetcher.clone(), Dispatch::none());

        let report = dispatcher
            .run_concurrent(records, &batches, in_flight(4))
            .await;

        assert_eq!(sorted_ids(&report.divergences), vec![2, 6]);
        assert_eq!(report.failed_batches.len(), 1);
        assert_eq!(report.failed_batches[0].batch_index, 1);
        assert_eq!(report.failed_batches[0].page, 2);
        assert_eq!(report.failed_batches[0].kind, "bad_status");

        let mut calls = fetcher.calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_swallows_comparison_errors() {
        let (records, batches, pages) = three_batch_fixture();
        let dispatcher = Dispatcher::new(
            Arc::new(StubCatalog::new(pages)),
            Arc::new(RejectingComparator),
            Dispatch::none(),
        );

        let report = dispatcher
            .run(DispatchPolicy::Concurrent, records, &batches, in_flight(2))
            .await
            .unwrap();
        assert!(report.divergences.is_empty());
        assert_eq!(report.failed_batches.len(), 3);
        assert!(report.failed_batches.iter().all(|f| f.kind == "comparison"));
    }

    #[tokio::test]
    async fn test_sequential_aborts_at_failing_batch() {
        let (records, batches, pages) = three_batch_fixture();
        let fetcher = Arc::new(StubCatalog::new(pages).failing_on(2));
        let dispatcher = Dispatcher::with_field_comparator(fetcher.clone(), Dispatch::none());

        let err = dispatcher
            .run_sequential(&records, &batches)
            .await
            .unwrap_err();
        assert_eq!(err.batch_index, 1);
        assert_eq!(err.page, 2);
        assert!(matches!(
            err.source,
            BatchError::Fetch(FetchError::BadStatus { code: 500, .. })
        ));
        assert_eq!(err.to_string(), "batch 2 (page 2) failed: catalog API error 500: boom");
        assert_eq!(fetcher.calls(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_sequential_preserves_batch_order() {
        let (records, batches, pages) = three_batch_fixture();
        let dispatcher =
            Dispatcher::with_field_comparator(Arc::new(StubCatalog::new(pages)), Dispatch::none());

        let divs = dispatcher.run_sequential(&records, &batches).await.unwrap();
        let ids: Vec<i64> = divs.iter().map(|d| d.record_id).collect();
        assert_eq!(ids, vec![2, 6]);
    }

    #[tokio::test]
    async fn test_sequential_propagates_comparison_error() {
        let (records, batches, pages) = three_batch_fixture();
        let dispatcher = Dispatcher::new(
            Arc::new(StubCatalog::new(pages)),
            Arc::new(RejectingComparator),
            Dispatch::none(),
        );

        let err = dispatcher
            .run(DispatchPolicy::Sequential, records, &batches, in_flight(1))
            .await
            .unwrap_err();
        assert_eq!(err.batch_index, 0);
        assert_eq!(err.source.kind(), "comparison");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_respects_in_flight_limit() {
        let records: Vec<Record> = (1..=40).map(record).collect();
        let batches = plan_batches(records.len(), NonZeroUsize::new(1).unwrap(), 1).unwrap();
        let fetcher =
            Arc::new(StubCatalog::new(HashMap::new()).with_delay(Duration::from_millis(10)));
        let dispatcher = Dispatcher::with_field_comparator(fetcher.clone(), Dispatch::none());

        let report = dispatcher
            .run_concurrent(records.into(), &batches, in_flight(3))
            .await;

        assert_eq!(report.divergences.len(), 40);
        let peak = fetcher.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight fetches was {}", peak);
        assert!(peak > 1, "fetches never overlapped");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_repeated_runs_yield_same_divergences() {
        let (records, batches, pages) = three_batch_fixture();
        let dispatcher =
            Dispatcher::with_field_comparator(Arc::new(StubCatalog::new(pages)), Dispatch::none());

        let mut first = dispatcher
            .run_concurrent(Arc::clone(&records), &batches, in_flight(3))
            .await
            .divergences;
        let mut second = dispatcher
            .run_concurrent(records, &batches, in_flight(3))
            .await
            .divergences;
        first.sort_by_key(|d| d.record_id);
        second.sort_by_key(|d| d.record_id);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_plan_returns_empty_report() {
        let dispatcher = Dispatcher::with_field_comparator(
            Arc::new(StubCatalog::new(HashMap::new())),
            Dispatch::none(),
        );
        let records: Arc<[Record]> = Vec::new().into();

        let report = dispatcher
            .run_concurrent(records.clone(), &[], in_flight(1))
            .await;
        assert!(report.divergences.is_empty() && report.is_complete());
        assert!(dispatcher.run_sequential(&records, &[]).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failures_are_logged_to_injected_logger() {
        let (records, batches, pages) = three_batch_fixture();
        let (logger, logs) = capturing_logger();
        let dispatcher = Dispatcher::with_field_comparator(
            Arc::new(StubCatalog::new(pages).failing_on(2)),
            logger,
        );

        dispatcher
            .run_concurrent(records, &batches, in_flight(4))
            .await;

        let output = logs.contents();
        assert!(output.contains("Processing batch 1/3 (records 1-2)"), "{}", output);
        assert!(output.contains("Error processing batch 2: catalog API error 500: boom"));
        assert!(output.contains("Completed all 3 batches, found 2 divergences"));
    }
}
