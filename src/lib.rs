//! # aiodb
//!
//! Async SQLite/MySQL access driven by two files: a YAML config that picks
//! the backend, and a keyed SQL file that holds every statement.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use aiodb::prelude::*;
//!
//! // config.yml selects sqlite or mysql; queries.sql must define `create_table`
//! let mut db = Database::connect("config.yml", "queries.sql").await?;
//!
//! db.execute("add_user", Params::named([("name", "ada")])).await?;
//! let row = db.fetch_one("get_user", Params::positional([Value::Int(1)])).await?;
//! ```
//!
//! ## Query file format
//!
//! ```text
//! -- #{ get_user
//! SELECT * FROM users WHERE id = ?;
//! -- #}
//! ```

pub mod config;
pub mod database;
pub mod driver;
pub mod error;
pub mod loader;
pub mod params;
pub mod value;

pub mod prelude {
    pub use crate::config::{DatabaseConfig, DriverKind};
    pub use crate::database::{Database, DatabaseBuilder};
    pub use crate::driver::Driver;
    pub use crate::error::*;
    pub use crate::loader::{LoadWarning, QueryTable, WarningKind};
    pub use crate::params::Params;
    pub use crate::value::{Row, Value};
}

/// Parse keyed SQL text into a query table.
///
/// # Example
///
/// ```
/// let table = aiodb::parse_queries("-- #{ ping\nSELECT 1;\n-- #}\n");
/// assert_eq!(table.get("ping"), Some("SELECT 1;"));
/// ```
pub fn parse_queries(input: &str) -> loader::QueryTable {
    loader::QueryTable::parse(input)
}
