//! # Digbin Core
//!
//! The inbox ingestion pipeline for a record catalog: data models,
//! eligibility predicates, candidate scoring, retry backoff, OCR line
//! parsing, the store abstraction, and the [`pipeline::Pipeline`]
//! orchestrator that drives every item transition.
//!
//! This crate has no database driver, HTTP stack, or filesystem I/O. The
//! `digbin` crate provides the SQLite store, the OCR and lookup
//! collaborators, the scan passes, and the CLI / server surfaces.

pub mod backoff;
pub mod clock;
pub mod eligibility;
pub mod fields;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod store;
