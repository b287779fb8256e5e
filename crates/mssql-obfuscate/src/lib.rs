//! # mssql-obfuscate
//!
//! Obfuscation of SQL text and SQL Server XML execution plans before they
//! leave the collector. Statement literals routinely contain customer data,
//! so every piece of SQL the scraper emits downstream passes through here
//! first.
//!
//! Two operations:
//!
//! - [`obfuscate_sql`]: replace literals and parameters in a T-SQL
//!   statement with `?` placeholders.
//! - [`obfuscate_xml_plan`]: stream an XML execution plan token by token,
//!   rewriting the attributes that embed SQL fragments
//!   (`StatementText`, `ConstValue`, `ScalarString`,
//!   `ParameterCompiledValue`) through the SQL obfuscator.
//!
//! The obfuscator itself is process-wide state initialized exactly once on
//! first use; the module surface is pure functions.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod plan;
pub mod sql;

pub use plan::{OBFUSCATED_PLAN_ATTRIBUTES, obfuscate_xml_plan};
pub use sql::{ObfuscatedQuery, SqlConfig, SqlObfuscator, obfuscate_sql};

use thiserror::Error;

/// Errors surfaced by the obfuscation facade.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObfuscateError {
    /// A string literal was opened but never closed.
    #[error("unterminated string literal")]
    UnterminatedLiteral,

    /// A block comment was opened but never closed.
    #[error("unterminated block comment")]
    UnterminatedComment,

    /// The XML plan could not be parsed.
    #[error("malformed query plan: {0}")]
    MalformedPlan(String),

    /// The rewritten XML plan could not be serialized.
    #[error("failed to serialize query plan: {0}")]
    PlanSerialize(String),
}
