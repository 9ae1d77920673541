//! Reconciliation service.
//!
//! Ties configuration, batch planning, and dispatch together: given decoded
//! records and a batch size, plan batches from the configured start page,
//! run the chosen [`DispatchPolicy`], and time the whole run.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use catalog_reconcile_core::batch::{plan_batches, PlanError};
use catalog_reconcile_core::models::{Divergence, Record};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn, Dispatch};

use crate::catalog_client::HttpCatalogClient;
use crate::config::{Config, MAX_BATCH_SIZE};
use crate::dispatch::{BatchFailure, DispatchError, DispatchPolicy, Dispatcher};

/// Why a reconciliation produced no report.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The upload needs more catalog pages than remain after `start_page`.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// The sequential policy hit a failing batch.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub divergences: Vec<Divergence>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_batches: Vec<BatchFailure>,
    /// Number of batches planned.
    #[serde(skip)]
    pub batches: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    config: Arc<Config>,
    dispatcher: Dispatcher,
}

impl Reconciler {
    pub fn new(config: Arc<Config>, dispatcher: Dispatcher) -> Self {
        Self { config, dispatcher }
    }

    /// Builds a reconciler that fetches from the configured catalog over HTTP.
    pub fn from_config(config: Arc<Config>, logger: Dispatch) -> Result<Self> {
        let client = HttpCatalogClient::new(&config.catalog)?;
        let dispatcher = Dispatcher::with_field_comparator(Arc::new(client), logger);
        Ok(Self::new(config, dispatcher))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves an optional caller-supplied batch size against the
    /// configured default. See [`resolve_batch_size`].
    pub fn batch_size(&self, requested: Option<&str>) -> NonZeroUsize {
        let default = self.config.batch.default_batch_size();
        resolve_batch_size(requested, default).log_to(self.dispatcher.logger())
    }

    /// Runs one reconciliation.
    ///
    /// The concurrent policy always succeeds once planned (failed batches
    /// are listed in the report); the sequential policy returns the first
    /// batch failure.
    pub async fn reconcile(
        &self,
        records: Vec<Record>,
        batch_size: NonZeroUsize,
        policy: DispatchPolicy,
    ) -> Result<ReconcileReport, ReconcileError> {
        let started = Instant::now();
        let batches = plan_batches(records.len(), batch_size, self.config.catalog.start_page)?;
        let max_in_flight = self.config.batch.max_in_flight();

        let outcome = self
            .dispatcher
            .run(policy, records.into(), &batches, max_in_flight)
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let logger = self.dispatcher.logger().clone();
        tracing::dispatcher::with_default(&logger, || match &outcome {
            Ok(report) => info!(
                policy = ?policy,
                batches = batches.len(),
                divergences = report.divergences.len(),
                failed_batches = report.failed_batches.len(),
                elapsed_ms,
                "Reconciliation finished in {} ms",
                elapsed_ms
            ),
            Err(e) => warn!(policy = ?policy, elapsed_ms, "Reconciliation aborted: {}", e),
        });

        let report = outcome?;
        Ok(ReconcileReport {
            divergences: report.divergences,
            failed_batches: report.failed_batches,
            batches: batches.len(),
        })
    }
}

/// Picks the batch size for a request.
///
/// `requested` wins when it parses to an integer in `1..=1000`; otherwise a
/// warning is logged and `default` is used.
pub fn resolve_batch_size(requested: Option<&str>, default: NonZeroUsize) -> BatchSizeChoice {
    let Some(raw) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
        return BatchSizeChoice::Default(default);
    };

    match raw.parse::<usize>() {
        Err(e) => BatchSizeChoice::Unparsable {
            raw: raw.to_string(),
            reason: e.to_string(),
            default,
        },
        Ok(n) if !(1..=MAX_BATCH_SIZE).contains(&n) => {
            BatchSizeChoice::OutOfRange { value: n, default }
        }
        Ok(n) => match NonZeroUsize::new(n) {
            Some(size) => BatchSizeChoice::Override(size),
            None => BatchSizeChoice::Default(default),
        },
    }
}

/// How a batch size was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSizeChoice {
    Default(NonZeroUsize),
    Override(NonZeroUsize),
    Unparsable {
        raw: String,
        reason: String,
        default: NonZeroUsize,
    },
    OutOfRange {
        value: usize,
        default: NonZeroUsize,
    },
}

impl BatchSizeChoice {
    pub fn size(&self) -> NonZeroUsize {
        match self {
            BatchSizeChoice::Default(size) | BatchSizeChoice::Override(size) => *size,
            BatchSizeChoice::Unparsable { default, .. }
            | BatchSizeChoice::OutOfRange { default, .. } => *default,
        }
    }

    /// Logs the choice to `logger` and returns the size.
    pub fn log_to(self, logger: &Dispatch) -> NonZeroUsize {
        tracing::dispatcher::with_default(logger, || match &self {
            BatchSizeChoice::Default(_) => {}
            BatchSizeChoice::Override(size) => {
                info!("Overriding batch size to {}", size)
            }
            BatchSizeChoice::Unparsable {
                raw,
                reason,
                default,
            } => warn!(
                "Invalid batch size {:?}: {} (using default {})",
                raw, reason, default
            ),
            BatchSizeChoice::OutOfRange { value, default } => warn!(
                "Batch size {} out of allowed range [1,{}] (using default {})",
                value, MAX_BATCH_SIZE, default
            ),
        });
        self.size()
    }
}
