//! # page-sync
//!
//! Batch reconciliation of a knowledge graph's pages into a vector-capable
//! page store. Each run compares a fresh source snapshot with the store's
//! current rows and applies the minimal set of upserts (with a title
//! embedding) and deletes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐
//! │ PageSource  │   │  PageStore  │
//! │ graph/file  │   │ (paged read)│
//! └──────┬──────┘   └──────┬──────┘
//!        ▼                 ▼
//!   source snapshot   sink snapshot
//!        └───────┬─────────┘
//!                ▼
//!              diff ──▶ enrich (Embedder) ──▶ apply (upsert / delete)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pagesync init            # create the sqlite schema (no-op for postgrest)
//! pagesync sync --dry-run  # show what would change
//! pagesync                 # run once
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`filter`] | Date-journal identifier filter |
//! | [`source`] | Upstream page sources, source snapshot |
//! | [`store`] | Store backends, sink snapshot |
//! | [`diff`] | Three-way snapshot diff |
//! | [`embedding`] | Embedding providers |
//! | [`enrich`] | Vectors for the upsert set |
//! | [`apply`] | Upserts and deletes with per-item isolation |
//! | [`sync`] | Run orchestration |

pub mod apply;
pub mod config;
pub mod diff;
pub mod embedding;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod report;
pub mod source;
pub mod store;
pub mod sync;
