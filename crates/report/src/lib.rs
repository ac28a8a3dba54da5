//! HTTP client for the emission test records API.
//!
//! The records service stores finalized sessions, renders PDF reports and
//! computes maintenance recommendations. This crate only speaks its wire
//! contract; see [`ReportClient`].

pub mod client;
pub mod records;

pub use client::{ReportClient, ReportError};
pub use records::TestRecord;
