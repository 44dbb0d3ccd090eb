//! MySQL backend over a single sqlx connection.

use super::{Driver, DriverFuture};
use crate::config::{DriverKind, MySqlConfig};
use crate::error::{DbError, DbResult};
use crate::value::{Row, Value};

use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, MySql, Row as _, TypeInfo, ValueRef};

pub struct MySqlDriver {
    conn: MySqlConnection,
    in_transaction: bool,
}

impl MySqlDriver {
    pub async fn connect(config: &MySqlConfig) -> DbResult<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .database(&config.schema);
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(DbError::connection)?;

        tracing::info!(
            "Connected to MySQL database: {}@{}:{}/{}",
            config.username,
            config.host,
            config.port,
            config.schema
        );
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

impl Driver for MySqlDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Mysql
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
                tracing::warn!("Closing MySQL connection with uncommitted changes; rolling back");
                (&mut this.conn)
                    .execute(sqlx::raw_sql("ROLLBACK"))
                    .await
                    .map_err(DbError::execution)?;
            }
            this.conn.close().await.map_err(DbError::connection)?;
            tracing::info!("Disconnected from MySQL database");
            Ok(())
        })
    }
}

fn bind_values<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
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

fn decode_row(row: &MySqlRow) -> Row {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..row.len()).map(|i| decode_column(row, i)).collect();
    Row::new(columns, values)
}

fn decode_column(row: &MySqlRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(e) => {
            tracing::warn!("Could not read MySQL column {}: {}", index, e);
            return Value::Null;
        }
    };

    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get_unchecked::<bool, _>(index).map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            row.try_get_unchecked::<i64, _>(index).map(Value::Int)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get_unchecked::<u64, _>(index).map(|v| {
            i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(v.to_string()))
        }),
        "FLOAT" => row
            .try_get_unchecked::<f32, _>(index)
            .map(|v| Value::Float(v as f64)),
        "DOUBLE" => row.try_get_unchecked::<f64, _>(index).map(Value::Float),
        "DATE" => row
            .try_get_unchecked::<chrono::NaiveDate, _>(index)
            .map(|d| Value::Text(d.to_string())),
        "TIME" => row
            .try_get_unchecked::<chrono::NaiveTime, _>(index)
            .map(|t| Value::Text(t.to_string())),
        "DATETIME" => row
            .try_get_unchecked::<chrono::NaiveDateTime, _>(index)
            .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
        "TIMESTAMP" => row
            .try_get_unchecked::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|ts| Value::Text(ts.to_rfc3339())),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => row.try_get_unchecked::<Vec<u8>, _>(index).map(Value::Blob),
        // CHAR, VARCHAR, TEXT, DECIMAL, JSON, ENUM, SET
        _ => row.try_get_unchecked::<String, _>(index).map(Value::Text),
    };

    decoded.unwrap_or_else(|e| {
        tracing::warn!("Could not decode MySQL column {} ({}): {}", index, type_name, e);
        Value::Null
    })
}
