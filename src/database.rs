//! The database facade.
//!
//! A [`Database`] ties together a configuration, one open driver connection
//! and a [`QueryTable`]. Statements are addressed by key and forwarded to the
//! driver with their parameters.
//!
//! # Example
//!
//! ```rust,ignore
//! use aiodb::prelude::*;
//!
//! let mut db = Database::connect("config.yml", "queries.sql").await?;
//! db.execute("add_user", Params::positional([Value::from("ada")])).await?;
//! let users = db.fetch_all("list_users", Params::None).await?;
//! db.close().await?;
//! ```

use crate::config::DatabaseConfig;
use crate::driver::{self, Driver};
use crate::error::{DbError, DbResult};
use crate::loader::QueryTable;
use crate::params::Params;
use crate::value::Row;

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key run automatically by [`Database::connect`].
pub const BOOTSTRAP_KEY: &str = "create_table";

/// An open database handle.
///
/// The connection is released when the handle is closed or dropped.
pub struct Database {
    driver: Box<dyn Driver>,
    queries: Arc<QueryTable>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("driver", &self.driver.name())
            .field("queries", &self.queries.len())
            .finish()
    }
}

impl Database {
    /// Connect using a YAML config file and a keyed SQL file, then run the
    /// `create_table` statement.
    pub async fn connect(config_path: impl AsRef<Path>, sql_path: impl AsRef<Path>) -> DbResult<Self> {
        Self::builder()
            .config_path(config_path.as_ref())
            .queries_path(sql_path.as_ref())
            .connect()
            .await
    }

    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// Build a handle from an already-open driver.
    pub fn from_driver(driver: Box<dyn Driver>, queries: Arc<QueryTable>) -> Self {
        Self { driver, queries }
    }

    /// The statement stored under `key`. A block with an empty body counts
    /// as missing.
    pub fn query(&self, key: &str) -> DbResult<&str> {
        lookup(&self.queries, key)
    }

    pub fn queries(&self) -> &Arc<QueryTable> {
        &self.queries
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    /// Run a keyed statement and commit. Returns affected rows.
    pub async fn execute(&mut self, key: &str, params: Params) -> DbResult<u64> {
        let queries = Arc::clone(&self.queries);
        let sql = lookup(&queries, key)?;
        let (sql, values) = params.resolve_for(sql, self.driver.kind())?;

        tracing::debug!(key, params = values.len(), "execute");
        let affected = self.driver.execute(&sql, &values).await?;
        self.commit().await?;
        Ok(affected)
    }

    /// Run a keyed query and return its first row, or `None` when it yields nothing.
    pub async fn fetch_one(&mut self, key: &str, params: Params) -> DbResult<Option<Row>> {
        let queries = Arc::clone(&self.queries);
        let sql = lookup(&queries, key)?;
        let (sql, values) = params.resolve_for(sql, self.driver.kind())?;

        tracing::debug!(key, params = values.len(), "fetch_one");
        self.driver.fetch_one(&sql, &values).await
    }

    /// Run a keyed query and return all rows.
    pub async fn fetch_all(&mut self, key: &str, params: Params) -> DbResult<Vec<Row>> {
        let queries = Arc::clone(&self.queries);
        let sql = lookup(&queries, key)?;
        let (sql, values) = params.resolve_for(sql, self.driver.kind())?;

        tracing::debug!(key, params = values.len(), "fetch_all");
        let rows = self.driver.fetch_all(&sql, &values).await?;
        tracing::debug!(key, rows = rows.len(), "fetched");
        Ok(rows)
    }

    /// Run a keyed DDL statement without parameters and commit.
    pub async fn create_table(&mut self, key: &str) -> DbResult<()> {
        let queries = Arc::clone(&self.queries);
        let sql = lookup(&queries, key)?;

        tracing::debug!(key, "create_table");
        self.driver.execute(sql, &[]).await?;
        self.commit().await
    }

    pub async fn commit(&mut self) -> DbResult<()> {
        self.driver.commit().await
    }

    /// Close the connection, rolling back anything uncommitted.
    pub async fn close(self) -> DbResult<()> {
        self.driver.close().await
    }
}

fn lookup<'q>(queries: &'q QueryTable, key: &str) -> DbResult<&'q str> {
    queries
        .get(key)
        .filter(|sql| !sql.is_empty())
        .ok_or_else(|| DbError::query_not_found(key))
}

/// Builder for [`Database`].
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    config: Option<DatabaseConfig>,
    config_path: Option<PathBuf>,
    queries: Option<QueryTable>,
    queries_path: Option<PathBuf>,
    bootstrap: Bootstrap,
}

#[derive(Debug, Default)]
enum Bootstrap {
    #[default]
    Default,
    Key(String),
    Disabled,
}

impl DatabaseBuilder {
    /// Use an in-memory configuration.
    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from a YAML file.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Use an already parsed query table.
    pub fn queries(mut self, queries: QueryTable) -> Self {
        self.queries = Some(queries);
        self
    }

    /// Load the query table from a keyed SQL file.
    pub fn queries_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.queries_path = Some(path.into());
        self
    }

    /// Run a different key right after connecting.
    pub fn bootstrap(mut self, key: impl Into<String>) -> Self {
        self.bootstrap = Bootstrap::Key(key.into());
        self
    }

    /// Skip the bootstrap statement.
    pub fn no_bootstrap(mut self) -> Self {
        self.bootstrap = Bootstrap::Disabled;
        self
    }

    /// Open the connection, load the queries and run the bootstrap statement.
    pub async fn connect(self) -> DbResult<Database> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => DatabaseConfig::load(path)?,
            (None, None) => {
                return Err(DbError::Config("no configuration given".to_string()));
            }
        };

        let queries = match (self.queries, self.queries_path) {
            (Some(queries), _) => queries,
            (None, Some(path)) => QueryTable::load(path)?,
            (None, None) => QueryTable::default(),
        };

        let driver = driver::connect(&config).await?;
        let mut db = Database::from_driver(driver, Arc::new(queries));

        let bootstrap = match self.bootstrap {
            Bootstrap::Default => Some(BOOTSTRAP_KEY.to_string()),
            Bootstrap::Key(key) => Some(key),
            Bootstrap::Disabled => None,
        };
        if let Some(key) = bootstrap {
            if let Err(e) = db.create_table(&key).await {
                if let Err(close_err) = db.close().await {
                    tracing::warn!("Failed to close connection after bootstrap error: {}", close_err);
                }
                return Err(e);
            }
        }

        Ok(db)
    }
}
