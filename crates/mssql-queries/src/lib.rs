//! # mssql-queries
//!
//! Curated T-SQL diagnostic queries for scraping SQL Server telemetry.
//!
//! The catalog owns the fixed query templates and the two degrees of
//! parameterization they allow:
//!
//! - **Instance-name filtering**: an optional `@@SERVERNAME` predicate is
//!   spliced into a designated hole so one collector host can target a
//!   single named instance among several.
//! - **Sampling bounds**: the ranked top-query and live-sample queries take
//!   a row cap and a lookback window.
//!
//! Edition and version differences (Standard/Enterprise/Express vs. Azure
//! SQL, pre/post-2012 column sets) are handled *inside* the T-SQL via
//! `SERVERPROPERTY` checks, so the catalog stays a pure string function:
//! [`query_for`] is deterministic and identical parameters produce
//! byte-identical text.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod kind;

pub use catalog::query_for;
pub use kind::{QueryKind, SampleParams};
