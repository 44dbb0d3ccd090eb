//! Database drivers.
//!
//! A [`Driver`] owns exactly one connection and runs already-resolved SQL with
//! positional bindings. Which implementation is used is decided once, from
//! configuration, by [`connect`].
//!
//! Writes follow DB-API semantics: [`Driver::execute`] opens a transaction if
//! none is open, [`Driver::commit`] ends it, [`Driver::close`] rolls back
//! whatever was not committed.

pub mod mysql;
pub mod sqlite;

pub use mysql::MySqlDriver;
pub use sqlite::SqliteDriver;

use crate::config::{DatabaseConfig, DriverKind};
use crate::error::DbResult;
use crate::value::{Row, Value};

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by driver operations.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = DbResult<T>> + Send + 'a>>;

/// Capability interface shared by the SQLite and MySQL backends.
pub trait Driver: Send {
    /// Which backend this is.
    fn kind(&self) -> DriverKind;

    /// Short backend name (`"sqlite"`, `"mysql"`).
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;

    /// Run a statement inside the current transaction, opening one if needed.
    /// Returns the number of affected rows.
    fn execute<'a>(&'a mut self, sql: &'a str, params: &'a [Value]) -> DriverFuture<'a, u64>;

    /// Run a query and return its first row, if any.
    fn fetch_one<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> DriverFuture<'a, Option<Row>>;

    /// Run a query and return every row.
    fn fetch_all<'a>(&'a mut self, sql: &'a str, params: &'a [Value]) -> DriverFuture<'a, Vec<Row>>;

    /// Commit the open transaction. No-op when none is open.
    fn commit(&mut self) -> DriverFuture<'_, ()>;

    /// Roll back anything uncommitted and close the connection.
    fn close(self: Box<Self>) -> DriverFuture<'static, ()>;
}

/// Open the driver selected by `config`.
pub async fn connect(config: &DatabaseConfig) -> DbResult<Box<dyn Driver>> {
    match config.kind() {
        DriverKind::Sqlite => Ok(Box::new(SqliteDriver::connect(config.sqlite()?).await?)),
        DriverKind::Mysql => Ok(Box::new(MySqlDriver::connect(config.mysql()?).await?)),
    }
}
