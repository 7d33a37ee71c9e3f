//! # digbin
//!
//! A local-first inbox for cataloguing records.
//!
//! Items enter the inbox from a quick add, a barcode scan, a cover photo,
//! or a spreadsheet import. Scan passes read cover text, look each item up
//! against a metadata provider, and either commit the best match or leave
//! it for a human to review. All state lives in one SQLite file.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │  Capture  │──▶│   Pipeline    │──▶│  SQLite  │
//! │ CLI/import│   │ (digbin-core) │   │  inbox   │
//! └───────────┘   └──────┬───────┘   └────┬─────┘
//!                        │                │
//!              ┌─────────┴────┐     ┌─────┴──────┐
//!              │ Scan passes  │     │ LiveInbox  │
//!              │  OCR/lookup  │     │ HTTP + SSE │
//!              └──────────────┘     └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed inbox store |
//! | [`traits`] | OCR and lookup collaborator traits |
//! | [`providers`] | Local collaborator implementations |
//! | [`scan`] | OCR and lookup scan passes |
//! | [`feed`] | Live inbox projections |
//! | [`capture`] | `dig add` |
//! | [`review`] | Human decisions |
//! | [`get`] | `dig list` / `dig show` |
//! | [`stats`] | `dig stats` |
//! | [`server`] | HTTP server |

pub mod capture;
pub mod config;
pub mod db;
pub mod feed;
pub mod get;
pub mod migrate;
pub mod providers;
pub mod review;
pub mod scan;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod traits;
