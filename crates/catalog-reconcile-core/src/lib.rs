//! # Catalog Reconcile Core
//!
//! Shared, I/O-free logic for Catalog Reconcile: record and catalog models,
//! batch planning, field-level comparison, and the catalog fetcher trait.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. The
//! application crate supplies the runtime, the HTTP fetcher, and the
//! dispatch policies that drive these pieces.

pub mod batch;
pub mod compare;
pub mod fetch;
pub mod models;
