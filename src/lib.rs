//! # Catalog Reconcile
//!
//! Reconciles bulk CSV uploads of product records against a paginated
//! external product catalog and reports field-level divergences.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │ CSV      │──▶│ BatchPlanner │──▶│  Dispatcher  │──▶│ Comparator │
//! │ upload   │   │ (core)       │   │ conc. / seq. │   │ (core)     │
//! └──────────┘   └─────────────┘   └──────┬───────┘   └────────────┘
//!                                          │
//!                                          ▼
//!                                   ┌──────────────┐
//!                                   │ Catalog API  │
//!                                   │ (HTTP fetch) │
//!                                   └──────────────┘
//! ```
//!
//! Batch `i` of the upload is compared against catalog page
//! `start_page + i`, fetched with `limit = batch_size`.
//!
//! ## Quick Start
//!
//! ```bash
//! recon serve                                   # start the HTTP server
//! recon check products.csv --batch-size 500     # reconcile one file
//! recon check products.csv --sequential         # fail on the first bad batch
//! recon config                                  # print effective config
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`logging`] | `tracing` subscriber construction |
//! | [`decode`] | CSV decoding |
//! | [`catalog_client`] | HTTP catalog fetcher |
//! | [`dispatch`] | Concurrent and sequential batch dispatch |
//! | [`reconcile`] | Planning, dispatch, and batch size resolution |
//! | [`check`] | One-shot CLI reconciliation |
//! | [`server`] | HTTP upload server |

pub mod catalog_client;
pub mod check;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod logging;
pub mod reconcile;
pub mod server;
