//! Statement parameters.
//!
//! Drivers only bind positionally (`?`). Named parameters are resolved here by
//! rewriting `:name` placeholders to `?` and ordering the values to match.
//!
//! The scan skips string literals and comments. For MySQL it also honors
//! backslash escapes inside quotes and `#` line comments.

use crate::config::DriverKind;
use crate::error::{DbError, DbResult};
use crate::value::Value;

use std::borrow::Cow;
use std::collections::BTreeMap;

/// Parameters passed alongside a keyed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    /// Run the statement as-is.
    #[default]
    None,
    /// Values for `?` placeholders, in order.
    Positional(Vec<Value>),
    /// Values for `:name` placeholders.
    Named(BTreeMap<String, Value>),
}

impl Params {
    /// Build positional parameters.
    ///
    /// ```
    /// use aiodb::params::Params;
    /// use aiodb::value::Value;
    ///
    /// let params = Params::positional([Value::Int(1), Value::from("ada")]);
    /// assert_eq!(params.len(), 2);
    /// ```
    pub fn positional<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Params::Positional(values.into_iter().collect())
    }

    /// Build named parameters from `(name, value)` pairs.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(v) => v.len(),
            Params::Named(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produce the SQL to send and the values to bind, in placeholder order,
    /// using standard SQL lexing.
    pub fn resolve<'s>(&self, sql: &'s str) -> DbResult<(Cow<'s, str>, Vec<Value>)> {
        self.resolve_for(sql, DriverKind::Sqlite)
    }

    /// Like [`Params::resolve`], lexing the statement the way `kind` does.
    pub fn resolve_for<'s>(
        &self,
        sql: &'s str,
        kind: DriverKind,
    ) -> DbResult<(Cow<'s, str>, Vec<Value>)> {
        match self {
            Params::None => Ok((Cow::Borrowed(sql), Vec::new())),
            Params::Positional(values) => Ok((Cow::Borrowed(sql), values.clone())),
            Params::Named(values) => {
                let (rewritten, bound) = rewrite_named(sql, values, kind)?;
                Ok((Cow::Owned(rewritten), bound))
            }
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<BTreeMap<String, Value>> for Params {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Params::Named(values)
    }
}

/// Replace `:name` placeholders with `?`, collecting the matching values.
///
/// Quoted strings and identifiers, `--` and `/* */` comments are copied
/// untouched. `::` is never a placeholder.
fn rewrite_named(
    sql: &str,
    values: &BTreeMap<String, Value>,
    kind: DriverKind,
) -> DbResult<(String, Vec<Value>)> {
    let mysql = kind == DriverKind::Mysql;
    let mut out = String::with_capacity(sql.len());
    let mut bound = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                out.push(c);
                while let Some(q) = chars.next() {
                    out.push(q);
                    if q == c {
                        break;
                    }
                    if mysql && q == '\\' && c != '`' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    }
                }
            }
            '#' if mysql => {
                out.push(c);
                for q in chars.by_ref() {
                    out.push(q);
                    if q == '\n' {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(c);
                for q in chars.by_ref() {
                    out.push(q);
                    if q == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("/*");
                let mut prev = '\0';
                for q in chars.by_ref() {
                    out.push(q);
                    if prev == '*' && q == '/' {
                        break;
                    }
                    prev = q;
                }
            }
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                out.push_str("::");
            }
            ':' if chars.peek().is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') => {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = values
                    .get(&name)
                    .ok_or_else(|| DbError::MissingParameter(name.clone()))?;
                bound.push(value.clone());
                out.push('?');
            }
            _ => out.push(c),
        }
    }

    Ok((out, bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_none_passes_through() {
        let (sql, values) = Params::None.resolve("SELECT 1").unwrap();
        assert_eq!(sql, "SELECT 1");
        assert!(values.is_empty());
    }

    #[test]
    fn test_positional_passes_through() {
        let params = Params::positional([Value::Int(1), Value::from("x")]);
        let (sql, values) = params.resolve("SELECT ? , ?").unwrap();
        assert_eq!(sql, "SELECT ? , ?");
        assert_eq!(values, vec![Value::Int(1), Value::from("x")]);
    }

    #[test]
    fn test_named_rewrite_in_placeholder_order() {
        let params = Params::named([("name", Value::from("ada")), ("id", Value::Int(7))]);
        let (sql, values) = params
            .resolve("UPDATE users SET name = :name WHERE id = :id")
            .unwrap();
        assert_eq!(sql, "UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(values, vec![Value::from("ada"), Value::Int(7)]);
    }

    #[test]
    fn test_named_repeated() {
        let params = Params::named([("q", "%a%")]);
        let (sql, values) = params
            .resolve("SELECT * FROM t WHERE a LIKE :q OR b LIKE :q")
            .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a LIKE ? OR b LIKE ?");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_named_skips_literals_and_comments() {
        let params = Params::named([("id", 1i64)]);
        let sql = "SELECT ':nope', \"col:x\", `a:b` -- :nope\nFROM t /* :nope */ WHERE id = :id AND x::text = 'it''s :nope'";
        let (rewritten, values) = params.resolve(sql).unwrap();
        assert_eq!(
            rewritten,
            "SELECT ':nope', \"col:x\", `a:b` -- :nope\nFROM t /* :nope */ WHERE id = ? AND x::text = 'it''s :nope'"
        );
        assert_eq!(values, vec![Value::Int(1)]);
    }

    #[test]
    fn test_named_missing_value() {
        let params = Params::named([("id", 1i64)]);
        let err = params.resolve("SELECT :id, :other").unwrap_err();
        assert!(matches!(err, DbError::MissingParameter(ref n) if n == "other"));
    }

    #[test]
    fn test_mysql_backslash_escapes_and_hash_comments() {
        let params = Params::named([("id", 1i64)]);
        let sql = "SELECT 'O\\'Reilly :nope', \"a\\\":nope\" # :nope\nFROM t WHERE id = :id";
        let (rewritten, values) = params.resolve_for(sql, DriverKind::Mysql).unwrap();
        assert_eq!(
            rewritten,
            "SELECT 'O\\'Reilly :nope', \"a\\\":nope\" # :nope\nFROM t WHERE id = ?"
        );
        assert_eq!(values, vec![Value::Int(1)]);
    }

    #[test]
    fn test_backslash_is_literal_outside_mysql() {
        let params = Params::named([("x", 1i64)]);
        let (rewritten, values) = params.resolve("SELECT 'C:\\' || :x").unwrap();
        assert_eq!(rewritten, "SELECT 'C:\\' || ?");
        assert_eq!(values, vec![Value::Int(1)]);

        let err = params
            .resolve_for("SELECT 1 # :missing", DriverKind::Sqlite)
            .unwrap_err();
        assert!(matches!(err, DbError::MissingParameter(ref n) if n == "missing"));
    }

    #[test]
    fn test_time_literal_colon_untouched() {
        let params = Params::named(Vec::<(String, Value)>::new());
        let (sql, _) = params.resolve("SELECT '12:30', 5 :: int").unwrap();
        assert_eq!(sql, "SELECT '12:30', 5 :: int");
    }
}
