//! SQLite backend over a single sqlx connection.

use super::{Driver, DriverFuture};
use crate::config::{DriverKind, SqliteConfig};
use crate::error::{DbError, DbResult};
use crate::value::{Row, Value};

use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Executor, Row as _, Sqlite, TypeInfo, ValueRef};
use std::str::FromStr;

/// In-memory database marker accepted in `sqlite.file`.
pub const MEMORY: &str = ":memory:";

pub struct SqliteDriver {
    conn: SqliteConnection,
    in_transaction: bool,
}

impl SqliteDriver {
    /// Open the configured database file, creating it if missing.
    pub async fn connect(config: &SqliteConfig) -> DbResult<Self> {
        let options = if config.file == MEMORY {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(DbError::connection)?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.file)
                .create_if_missing(true)
        };

        let conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(DbError::connection)?;

        tracing::info!("Connected to SQLite database: {}", config.file);
        Ok(Self {
            conn,
            in_transaction: false,
        })
    }

    async fn begin(&mut self) -> DbResult<()> {
        if !self.in_transaction {
            (&mut self.conn)
                .execute(sqlx::raw_sql("BEGIN"))
                .await
                .map_err(DbError::execution)?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

impl Driver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn execute<'a>(&'a mut self, sql: &'a str, params: &'a [Value]) -> DriverFuture<'a, u64> {
        Box::pin(async move {
            self.begin().await?;
            let result = (&mut self.conn)
                .execute(bind_values(sqlx::query(sql), params))
                .await
                .map_err(DbError::execution)?;
            Ok(result.rows_affected())
        })
    }

    fn fetch_one<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> DriverFuture<'a, Option<Row>> {
        Box::pin(async move {
            let row = (&mut self.conn)
                .fetch_optional(bind_values(sqlx::query(sql), params))
                .await
                .map_err(DbError::execution)?;
            Ok(row.as_ref().map(decode_row))
        })
    }

    fn fetch_all<'a>(&'a mut self, sql: &'a str, params: &'a [Value]) -> DriverFuture<'a, Vec<Row>> {
        Box::pin(async move {
            let rows = (&mut self.conn)
                .fetch_all(bind_values(sqlx::query(sql), params))
                .await
                .map_err(DbError::execution)?;
            Ok(rows.iter().map(decode_row).collect())
        })
    }

    fn commit(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            if self.in_transaction {
                (&mut self.conn)
                    .execute(sqlx::raw_sql("COMMIT"))
                    .await
                    .map_err(DbError::execution)?;
                self.in_transaction = false;
            }
            Ok(())
        })
    }

    fn close(self: Box<Self>) -> DriverFuture<'static, ()> {
        Box::pin(async move {
            let mut this = *self;
            if this.in_transaction {
                tracing::warn!("Closing SQLite connection with uncommitted changes; rolling back");
                (&mut this.conn)
                    .execute(sqlx::raw_sql("ROLLBACK"))
                    .await
                    .map_err(DbError::execution)?;
            }
            this.conn.close().await.map_err(DbError::connection)?;
            tracing::info!("Disconnected from SQLite database");
            Ok(())
        })
    }
}

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Blob(v) => query.bind(v.clone()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Row {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..row.len()).map(|i| decode_column(row, i)).collect();
    Row::new(columns, values)
}

/// Decode by the storage class of the stored value, not the declared column type.
fn decode_column(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(e) => {
            tracing::warn!("Could not read SQLite column {}: {}", index, e);
            return Value::Null;
        }
    };

    let decoded = match type_name.as_str() {
        "INTEGER" | "INT4" | "INT8" | "BOOLEAN" => {
            row.try_get_unchecked::<i64, _>(index).map(Value::Int)
        }
        "REAL" => row.try_get_unchecked::<f64, _>(index).map(Value::Float),
        "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(index).map(Value::Blob),
        _ => row.try_get_unchecked::<String, _>(index).map(Value::Text),
    };

    decoded.unwrap_or_else(|e| {
        tracing::warn!("Could not decode SQLite column {} ({}): {}", index, type_name, e);
        Value::Null
    })
}
