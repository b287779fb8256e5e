//! Resource attribution for emitted batches.

/// Attribute keys for resource identity.
pub mod keys {
    /// Host name of the machine running the SQL Server instance.
    pub const COMPUTER_NAME: &str = "sqlserver.computer_name";
    /// SQL Server instance name (`@@SERVERNAME`, backslash normalized).
    pub const INSTANCE_NAME: &str = "sqlserver.instance_name";
    /// Database name, for database-scoped metrics.
    pub const DATABASE_NAME: &str = "sqlserver.database_name";
    /// Hex-encoded query hash, for query-scoped records.
    pub const QUERY_HASH: &str = "sqlserver.query_hash";
    /// Hex-encoded query plan hash, for query-scoped records.
    pub const QUERY_PLAN_HASH: &str = "sqlserver.query_plan_hash";
}

/// Resource attributes scoping a committed set of data points.
///
/// Every emission carries computer and instance name; database name and the
/// query hashes are set only where the mapper is scoped to one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceAttributes {
    computer_name: String,
    instance_name: String,
    database_name: Option<String>,
    query_hash: Option<String>,
    query_plan_hash: Option<String>,
}

impl ResourceAttributes {
    /// Create a resource with the mandatory computer and instance names.
    #[must_use]
    pub fn new(computer_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            computer_name: computer_name.into(),
            instance_name: instance_name.into(),
            ..Self::default()
        }
    }

    /// Scope the resource to a database.
    #[must_use]
    pub fn with_database_name(mut self, database_name: impl Into<String>) -> Self {
        self.database_name = Some(database_name.into());
        self
    }

    /// Scope the resource to a query by its hex-encoded hash pair.
    #[must_use]
    pub fn with_query_hashes(
        mut self,
        query_hash: impl Into<String>,
        query_plan_hash: impl Into<String>,
    ) -> Self {
        self.query_hash = Some(query_hash.into());
        self.query_plan_hash = Some(query_plan_hash.into());
        self
    }

    /// The `sqlserver.computer_name` value.
    #[must_use]
    pub fn computer_name(&self) -> &str {
        &self.computer_name
    }

    /// The `sqlserver.instance_name` value.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// The `sqlserver.database_name` value, if scoped to a database.
    #[must_use]
    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    /// The `sqlserver.query_hash` value, if query-scoped.
    #[must_use]
    pub fn query_hash(&self) -> Option<&str> {
        self.query_hash.as_deref()
    }

    /// The `sqlserver.query_plan_hash` value, if query-scoped.
    #[must_use]
    pub fn query_plan_hash(&self) -> Option<&str> {
        self.query_plan_hash.as_deref()
    }

    /// Flatten to `(key, value)` pairs in a fixed order.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (keys::COMPUTER_NAME, self.computer_name.clone()),
            (keys::INSTANCE_NAME, self.instance_name.clone()),
        ];
        if let Some(db) = &self.database_name {
            pairs.push((keys::DATABASE_NAME, db.clone()));
        }
        if let Some(hash) = &self.query_hash {
            pairs.push((keys::QUERY_HASH, hash.clone()));
        }
        if let Some(hash) = &self.query_plan_hash {
            pairs.push((keys::QUERY_PLAN_HASH, hash.clone()));
        }
        pairs
    }
}
