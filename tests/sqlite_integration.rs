//! SQLite integration tests for the database facade.
//!
//! Run: `cargo test --test sqlite_integration`

use aiodb::driver;
use aiodb::prelude::*;
use pretty_assertions::assert_eq;
use std::io::Write;

const QUERIES: &str = r#"
-- users table
-- #{ create_table
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    score REAL,
    avatar BLOB
);
-- #}

-- #{ add_user
INSERT INTO users (name, score) VALUES (?, ?);
-- #}

-- #{ add_user_named
INSERT INTO users (name, score) VALUES (:name, :score);
-- #}

-- #{ set_avatar
UPDATE users SET avatar = :avatar WHERE name = :name;
-- #}

-- #{ get_user
SELECT id, name, score, avatar FROM users WHERE name = ?;
-- #}

-- #{ list_users
SELECT id, name, score FROM users ORDER BY id;
-- #}

-- #{ count_users
SELECT COUNT(*) AS n FROM users;
-- #}
"#;

async fn memory_db() -> DbResult<Database> {
    let config = DatabaseConfig::builder().sqlite(":memory:").build()?;
    Database::builder()
        .config(config)
        .queries(QueryTable::parse(QUERIES))
        .connect()
        .await
}

async fn count(db: &mut Database) -> DbResult<i64> {
    let row = db.fetch_one("count_users", Params::None).await?;
    Ok(row.and_then(|r| r.get("n").and_then(Value::as_i64)).unwrap_or(-1))
}

#[tokio::test]
async fn test_bootstrap_creates_table() -> DbResult<()> {
    let mut db = memory_db().await?;
    assert_eq!(db.driver_name(), "sqlite");
    assert_eq!(count(&mut db).await?, 0);
    db.close().await
}

#[tokio::test]
async fn test_execute_positional_and_fetch() -> DbResult<()> {
    let mut db = memory_db().await?;

    let affected = db
        .execute("add_user", Params::positional([Value::from("ada"), Value::Float(9.5)]))
        .await?;
    assert_eq!(affected, 1);
    db.execute("add_user", Params::positional([Value::from("bob"), Value::Null]))
        .await?;

    let row = db
        .fetch_one("get_user", Params::positional([Value::from("ada")]))
        .await?
        .expect("ada should exist");
    assert_eq!(row.columns(), &["id", "name", "score", "avatar"]);
    assert_eq!(row.get("id"), Some(&Value::Int(1)));
    assert_eq!(row.get("name"), Some(&Value::Text("ada".into())));
    assert_eq!(row.get("score"), Some(&Value::Float(9.5)));
    assert_eq!(row.get("avatar"), Some(&Value::Null));

    let rows = db.fetch_all("list_users", Params::None).await?;
    let names: Vec<_> = rows
        .iter()
        .map(|r| r.get("name").and_then(Value::as_str).unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["ada", "bob"]);
    assert_eq!(rows[1].get("score"), Some(&Value::Null));

    db.close().await
}

#[tokio::test]
async fn test_execute_named() -> DbResult<()> {
    let mut db = memory_db().await?;

    db.execute(
        "add_user_named",
        Params::named([("score", Value::Float(1.0)), ("name", Value::from("cy"))]),
    )
    .await?;
    db.execute(
        "set_avatar",
        Params::named([("name", Value::from("cy")), ("avatar", Value::Blob(vec![1, 2, 3]))]),
    )
    .await?;

    let row = db
        .fetch_one("get_user", Params::positional([Value::from("cy")]))
        .await?
        .expect("cy should exist");
    assert_eq!(row.get("score"), Some(&Value::Float(1.0)));
    assert_eq!(row.get("avatar"), Some(&Value::Blob(vec![1, 2, 3])));

    db.close().await
}

#[tokio::test]
async fn test_fetch_one_empty() -> DbResult<()> {
    let mut db = memory_db().await?;
    let row = db
        .fetch_one("get_user", Params::positional([Value::from("nobody")]))
        .await?;
    assert_eq!(row, None);
    assert!(db.fetch_all("list_users", Params::None).await?.is_empty());
    db.close().await
}

#[tokio::test]
async fn test_unknown_key() -> DbResult<()> {
    let mut db = memory_db().await?;

    let err = db.execute("drop_everything", Params::None).await.unwrap_err();
    assert_eq!(err.to_string(), "No query found for key 'drop_everything'");
    assert!(matches!(
        db.fetch_all("nope", Params::None).await,
        Err(DbError::QueryNotFound(_))
    ));
    assert!(matches!(
        db.create_table("nope").await,
        Err(DbError::QueryNotFound(_))
    ));
    assert!(db.query("get_user")?.starts_with("SELECT"));

    db.close().await
}

#[tokio::test]
async fn test_missing_named_parameter() -> DbResult<()> {
    let mut db = memory_db().await?;
    let err = db
        .execute("add_user_named", Params::named([("name", "ada")]))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::MissingParameter(ref n) if n == "score"));
    assert_eq!(count(&mut db).await?, 0);
    db.close().await
}

#[tokio::test]
async fn test_execution_error_surfaces() -> DbResult<()> {
    let mut db = memory_db().await?;
    // name is NOT NULL
    let err = db
        .execute("add_user", Params::positional([Value::Null, Value::Null]))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Execution(_)));
    db.close().await
}

#[tokio::test]
async fn test_bootstrap_key_required() {
    let config = DatabaseConfig::builder().sqlite(":memory:").build().unwrap();
    let err = Database::builder()
        .config(config)
        .queries(QueryTable::parse("-- #{ ping\nSELECT 1;\n-- #}\n"))
        .connect()
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No query found for key 'create_table'");
}

#[tokio::test]
async fn test_no_bootstrap_and_custom_bootstrap() -> DbResult<()> {
    let config = DatabaseConfig::builder().sqlite(":memory:").build()?;
    let mut db = Database::builder()
        .config(config.clone())
        .queries(QueryTable::parse("-- #{ ping\nSELECT 1 AS one;\n-- #}\n"))
        .no_bootstrap()
        .connect()
        .await?;
    let row = db.fetch_one("ping", Params::None).await?.unwrap();
    assert_eq!(row.get("one"), Some(&Value::Int(1)));
    db.close().await?;

    let db = Database::builder()
        .config(config)
        .queries(QueryTable::parse(
            "-- #{ schema\nCREATE TABLE t (x INTEGER);\n-- #}\n",
        ))
        .bootstrap("schema")
        .connect()
        .await?;
    db.close().await
}

#[tokio::test]
async fn test_connect_from_files_persists_commits() -> DbResult<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("app.db");
    let config_path = dir.path().join("config.yml");
    let sql_path = dir.path().join("queries.sql");

    std::fs::write(
        &config_path,
        format!(
            "database:\n  type: sqlite\n  sqlite:\n    file: {}\n",
            db_path.display()
        ),
    )?;
    let mut sql_file = std::fs::File::create(&sql_path)?;
    sql_file.write_all(QUERIES.as_bytes())?;
    drop(sql_file);

    let mut db = Database::connect(&config_path, &sql_path).await?;
    assert_eq!(db.queries().len(), 7);
    db.execute("add_user", Params::positional([Value::from("ada"), Value::Int(1)]))
        .await?;
    db.close().await?;

    let mut db = Database::connect(&config_path, &sql_path).await?;
    assert_eq!(count(&mut db).await?, 1);
    db.close().await
}

#[tokio::test]
async fn test_driver_rolls_back_uncommitted_on_close() -> DbResult<()> {
    let dir = tempfile::tempdir()?;
    let db_file = dir.path().join("tx.db");
    let config = DatabaseConfig::builder()
        .sqlite(db_file.display().to_string())
        .build()?;

    let mut conn = driver::connect(&config).await?;
    conn.execute("CREATE TABLE t (x INTEGER)", &[]).await?;
    assert!(conn.in_transaction());
    conn.commit().await?;
    assert!(!conn.in_transaction());

    conn.execute("INSERT INTO t (x) VALUES (?)", &[Value::Int(1)]).await?;
    conn.close().await?;

    let mut conn = driver::connect(&config).await?;
    let rows = conn.fetch_all("SELECT x FROM t", &[]).await?;
    assert!(rows.is_empty());

    // commit with nothing open is a no-op
    conn.commit().await?;
    conn.close().await
}

#[tokio::test]
async fn test_missing_query_file() {
    let config = DatabaseConfig::builder().sqlite(":memory:").build().unwrap();
    let err = Database::builder()
        .config(config)
        .queries_path("/nonexistent/aiodb/queries.sql")
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ResourceNotFound { .. }));
}

#[tokio::test]
async fn test_empty_body_is_not_found() -> DbResult<()> {
    let config = DatabaseConfig::builder().sqlite(":memory:").build()?;
    let mut db = Database::builder()
        .config(config)
        .queries(QueryTable::parse("-- #{ blank\n\n   \n-- #}\n"))
        .no_bootstrap()
        .connect()
        .await?;

    assert_eq!(db.queries().get("blank"), Some(""));
    let err = db.execute("blank", Params::None).await.unwrap_err();
    assert_eq!(err.to_string(), "No query found for key 'blank'");
    assert!(matches!(
        db.fetch_all("blank", Params::None).await,
        Err(DbError::QueryNotFound(_))
    ));
    assert!(matches!(
        db.fetch_one("blank", Params::None).await,
        Err(DbError::QueryNotFound(_))
    ));
    assert!(matches!(db.query("blank"), Err(DbError::QueryNotFound(_))));
    db.close().await
}

#[tokio::test]
async fn test_empty_bootstrap_fails_connect() {
    let config = DatabaseConfig::builder().sqlite(":memory:").build().unwrap();
    let err = Database::builder()
        .config(config)
        .queries(QueryTable::parse("-- #{ create_table\n-- #}\n"))
        .connect()
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No query found for key 'create_table'");
}

#[tokio::test]
async fn test_undecodable_column_is_null() -> DbResult<()> {
    let config = DatabaseConfig::builder().sqlite(":memory:").build()?;
    let mut conn = driver::connect(&config).await?;
    let rows = conn
        .fetch_all("SELECT CAST(x'ff' AS TEXT) AS bad, 'ok' AS good", &[])
        .await?;
    assert_eq!(rows[0].get("bad"), Some(&Value::Null));
    assert_eq!(rows[0].get("good"), Some(&Value::Text("ok".into())));
    conn.close().await
}
