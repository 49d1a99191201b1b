//! # Finecast
//!
//! Precedent-based breach impact prediction for GDPR enforcement cases.
//!
//! Given a free-text case description and four categorical risk
//! classifications, Finecast retrieves candidate precedent cases from an
//! external hybrid-search store, scores similarity against each candidate
//! via a reasoning oracle under bounded fan-out concurrency, and aggregates
//! the results into a single fine estimate with supporting evidence.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌───────────────┐   ┌───────────┐
//! │ validate │──▶│ retrieve │──▶│ select  │──▶│ fetch details │──▶│  analyze   │
//! │  input   │   │ (store)  │   │ top 5   │   │   (store)     │   │ (oracle ×N)│
//! └──────────┘   └──────────┘   └─────────┘   └───────────────┘   └─────┬─────┘
//!                                                                       ▼
//!                                                                 ┌───────────┐
//!                                                                 │ aggregate  │
//!                                                                 └───────────┘
//! ```
//!
//! The analysis stage fans out one worker per shortlisted precedent under a
//! process-wide concurrency bound and joins all of them; per-worker failures
//! become fallback assessments, never request failures. The fine estimate is
//! a deterministic similarity-weighted mean — oracle text explains the
//! number but can never change it.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and classification labels |
//! | [`error`] | Error taxonomy and stage names |
//! | [`store`] | Precedent store client (hybrid search + detail fetch) |
//! | [`oracle`] | Reasoning oracle client (similarity scoring + rationale) |
//! | [`select`] | Candidate shortlist selection |
//! | [`analysis`] | Bounded fan-out/fan-in similarity analysis |
//! | [`aggregate`] | Deterministic fine aggregation |
//! | [`pipeline`] | Stage sequencing and failure policy |
//! | [`server`] | HTTP API |

pub mod aggregate;
pub mod analysis;
pub mod config;
pub mod error;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod select;
pub mod server;
pub mod store;
