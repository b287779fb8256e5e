//! # mssql-scraper
//!
//! Periodic SQL Server telemetry scraper.
//!
//! Each [`Scraper`] instance owns one diagnostic query kind against one SQL
//! Server target: per scrape cycle it executes the catalog query through
//! the injected database client, maps the result rows into a metrics or
//! logs batch, and returns the batch together with any partial-failure
//! error. The only state carried across scrapes is an LRU cache of
//! previously observed cumulative counters, used to turn SQL Server's
//! monotonically growing totals into per-scrape deltas.
//!
//! ## Ownership model
//!
//! A scraper instance is single-owner: its connection, counter cache, and
//! batch builders are private to it, so a host may drive many instances
//! from parallel tasks without any locking in here. Sharing a cache
//! between instances is not supported.
//!
//! ## Lifecycle
//!
//! ```rust,ignore
//! let mut scraper = Scraper::new(kind, &config, db_provider, client_provider);
//! scraper.start().await?;
//! loop {
//!     let scraped = scraper.scrape_metrics(&cancel).await?;
//!     export(scraped.batch);
//!     if let Some(err) = scraped.error {
//!         tracing::warn!(%err, "partial scrape");
//!     }
//! }
//! scraper.shutdown().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod adapter;
pub mod cache;
pub mod config;
pub mod error;
mod mappers;
pub mod scraper;
pub mod waits;

pub use adapter::{ClientProvider, Connection, DbClient, DbError, DbProvider, RawRow, RowSet,
    SqlRowClient, SqlRowClientProvider};
pub use cache::CounterCache;
pub use config::{ConfigError, ConnectionConfig, ScraperConfig};
pub use error::{JoinedErrors, ScrapeError, Scraped};
pub use scraper::Scraper;
pub use waits::classify;
