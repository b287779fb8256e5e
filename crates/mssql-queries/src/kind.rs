//! Query kinds and their parameters.

/// Sampling bounds for the ranked top-query and live-sample queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleParams {
    /// Upper bound on rows fetched from the server per scrape.
    pub max_sample_count: u32,
    /// How far back (seconds) a query must have executed to be sampled.
    pub lookback_seconds: u32,
    /// How many ranked rows are retained for emission.
    pub top_n: u32,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            max_sample_count: 1000,
            lookback_seconds: 60,
            top_n: 200,
        }
    }
}

/// The closed set of diagnostic queries the scraper runs.
///
/// Each variant carries the parameters its template needs. Dispatch in the
/// scraper is on the variant, never on the query text: two kinds with
/// coincidentally equal text stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Per-file I/O statistics from `sys.dm_io_virtual_file_stats`.
    DatabaseIo {
        /// Restrict to this `@@SERVERNAME`, if set.
        instance_name: Option<String>,
    },
    /// Selected counters from `sys.dm_os_performance_counters`.
    PerfCounters {
        /// Restrict to this `@@SERVERNAME`, if set.
        instance_name: Option<String>,
    },
    /// Server properties and database state rollup.
    ServerProperties {
        /// Restrict to this `@@SERVERNAME`, if set.
        instance_name: Option<String>,
    },
    /// Ranked cumulative query statistics from `sys.dm_exec_query_stats`.
    QueryMetrics {
        /// Restrict to this `@@SERVERNAME`, if set.
        instance_name: Option<String>,
        /// Sampling bounds.
        params: SampleParams,
    },
    /// Ranked query statistics plus statement text and XML plan.
    QueryTextAndPlan {
        /// Restrict to this `@@SERVERNAME`, if set.
        instance_name: Option<String>,
        /// Sampling bounds.
        params: SampleParams,
    },
    /// Live session snapshots from `sys.dm_exec_sessions`/`requests`.
    QuerySamples {
        /// Restrict to this `@@SERVERNAME`, if set.
        instance_name: Option<String>,
        /// Sampling bounds.
        params: SampleParams,
    },
}

impl QueryKind {
    /// Short stable name, used in logs and error messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DatabaseIo { .. } => "database_io",
            Self::PerfCounters { .. } => "perf_counters",
            Self::ServerProperties { .. } => "server_properties",
            Self::QueryMetrics { .. } => "query_metrics",
            Self::QueryTextAndPlan { .. } => "query_text_and_plan",
            Self::QuerySamples { .. } => "query_samples",
        }
    }

    /// Whether this kind feeds the metrics pipeline.
    #[must_use]
    pub fn emits_metrics(&self) -> bool {
        matches!(
            self,
            Self::DatabaseIo { .. }
                | Self::PerfCounters { .. }
                | Self::ServerProperties { .. }
                | Self::QueryMetrics { .. }
        )
    }

    /// Whether this kind feeds the logs pipeline.
    #[must_use]
    pub fn emits_logs(&self) -> bool {
        matches!(self, Self::QueryTextAndPlan { .. } | Self::QuerySamples { .. })
    }

    /// The configured instance-name filter, if any.
    #[must_use]
    pub fn instance_name(&self) -> Option<&str> {
        match self {
            Self::DatabaseIo { instance_name }
            | Self::PerfCounters { instance_name }
            | Self::ServerProperties { instance_name }
            | Self::QueryMetrics { instance_name, .. }
            | Self::QueryTextAndPlan { instance_name, .. }
            | Self::QuerySamples { instance_name, .. } => instance_name.as_deref(),
        }
    }

    /// Sampling bounds, for the kinds that have them.
    #[must_use]
    pub fn sample_params(&self) -> Option<&SampleParams> {
        match self {
            Self::QueryMetrics { params, .. }
            | Self::QueryTextAndPlan { params, .. }
            | Self::QuerySamples { params, .. } => Some(params),
            _ => None,
        }
    }
}
