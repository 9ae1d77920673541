//! One-shot reconciliation from the command line.
//!
//! `recon check FILE` decodes a CSV file, reconciles it against the catalog,
//! and prints the report as pretty JSON on stdout. Logs go to stderr, so the
//! output can be piped straight into `jq`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::Dispatch;

use crate::config::Config;
use crate::decode::decode_file;
use crate::dispatch::DispatchPolicy;
use crate::reconcile::{ReconcileReport, Reconciler};

/// Reconciles `file` and returns the report.
///
/// A sequential run that aborts is returned as an error so the binary exits
/// non-zero.
pub async fn reconcile_file(
    config: &Config,
    logger: Dispatch,
    file: &Path,
    batch_size: Option<&str>,
    sequential: bool,
) -> Result<ReconcileReport> {
    let records = decode_file(file)?;
    let reconciler = Reconciler::from_config(Arc::new(config.clone()), logger)?;
    let size = reconciler.batch_size(batch_size);

    let policy = if sequential {
        DispatchPolicy::Sequential
    } else {
        DispatchPolicy::Concurrent
    };

    let report = reconciler
        .reconcile(records, size, policy)
        .await
        .with_context(|| format!("reconciliation of {} aborted", file.display()))?;
    Ok(report)
}

/// Runs `recon check` and prints the report.
pub async fn run_check(
    config: &Config,
    logger: Dispatch,
    file: &Path,
    batch_size: Option<&str>,
    sequential: bool,
) -> Result<()> {
    let report = reconcile_file(config, logger, file, batch_size, sequential).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.failed_batches.is_empty() {
        eprintln!(
            "warning: {} of {} batches failed and are missing from the report",
            report.failed_batches.len(),
            report.batches
        );
    }
    Ok(())
}
