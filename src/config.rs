//! Database configuration loaded from YAML.
//!
//! ```yaml
//! database:
//!   type: sqlite
//!   sqlite:
//!     file: data.db
//!   mysql:
//!     host: localhost
//!     username: root
//!     password: secret
//!     schema: app
//! ```

use crate::error::{DbError, DbResult};

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseConfig {
    pub database: DatabaseSection,
}

/// The `database:` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseSection {
    /// Which driver to open
    #[serde(rename = "type")]
    pub kind: DriverKind,

    #[serde(default)]
    pub sqlite: Option<SqliteConfig>,

    #[serde(default)]
    pub mysql: Option<MySqlConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Sqlite,
    Mysql,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Sqlite => "sqlite",
            DriverKind::Mysql => "mysql",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SqliteConfig {
    /// Database file path, or `:memory:`
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MySqlConfig {
    pub host: String,

    #[serde(default = "default_mysql_port")]
    pub port: u16,

    pub username: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Database (schema) to select after connecting
    pub schema: String,
}

fn default_mysql_port() -> u16 {
    3306
}

impl DatabaseConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DbError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(
            "Loaded config from {}: driver={}",
            path.display(),
            config.database.kind.as_str()
        );
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> DbResult<Self> {
        let config: DatabaseConfig = serde_yaml::from_str(content)
            .map_err(|e| DbError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the section for the selected driver is present.
    pub fn validate(&self) -> DbResult<()> {
        match self.database.kind {
            DriverKind::Sqlite => {
                self.sqlite()?;
            }
            DriverKind::Mysql => {
                self.mysql()?;
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> DriverKind {
        self.database.kind
    }

    pub fn sqlite(&self) -> DbResult<&SqliteConfig> {
        self.database
            .sqlite
            .as_ref()
            .ok_or_else(|| DbError::Config("missing 'database.sqlite' section".to_string()))
    }

    pub fn mysql(&self) -> DbResult<&MySqlConfig> {
        self.database
            .mysql
            .as_ref()
            .ok_or_else(|| DbError::Config("missing 'database.mysql' section".to_string()))
    }

    /// Start building a configuration in code.
    pub fn builder() -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::default()
    }
}

/// Builder for DatabaseConfig
#[derive(Debug, Default)]
pub struct DatabaseConfigBuilder {
    sqlite: Option<SqliteConfig>,
    mysql: Option<MySqlConfig>,
}

impl DatabaseConfigBuilder {
    /// Use SQLite with the given file (or `:memory:`)
    pub fn sqlite(mut self, file: impl Into<String>) -> Self {
        self.sqlite = Some(SqliteConfig { file: file.into() });
        self.mysql = None;
        self
    }

    /// Use MySQL
    pub fn mysql(
        mut self,
        host: impl Into<String>,
        username: impl Into<String>,
        password: Option<String>,
        schema: impl Into<String>,
    ) -> Self {
        self.mysql = Some(MySqlConfig {
            host: host.into(),
            port: default_mysql_port(),
            username: username.into(),
            password,
            schema: schema.into(),
        });
        self.sqlite = None;
        self
    }

    /// Override the MySQL port
    pub fn port(mut self, port: u16) -> Self {
        if let Some(mysql) = self.mysql.as_mut() {
            mysql.port = port;
        }
        self
    }

    /// Build the configuration
    pub fn build(self) -> DbResult<DatabaseConfig> {
        let kind = match (&self.sqlite, &self.mysql) {
            (Some(_), _) => DriverKind::Sqlite,
            (None, Some(_)) => DriverKind::Mysql,
            (None, None) => {
                return Err(DbError::Config("no database driver configured".to_string()));
            }
        };
        Ok(DatabaseConfig {
            database: DatabaseSection {
                kind,
                sqlite: self.sqlite,
                mysql: self.mysql,
            },
        })
    }
}
