//! Keyed SQL file loader.
//!
//! Statements live in a plain `.sql` file, each wrapped in a start and an end
//! marker line:
//!
//! ```text
//! -- #{ get_user
//! SELECT * FROM users WHERE id = ?;
//! -- #}
//! ```
//!
//! The start line carries the key (first token after the marker); the end
//! line carries nothing. Everything between the two is the statement body,
//! trimmed as a whole with its inner layout untouched. Anything outside a
//! block is ignored, so the file can hold free-form comments.
//!
//! Parsing is lenient: unmatched or re-opened markers never fail the load.
//! They resolve the same way every time (last block wins, unterminated blocks
//! are dropped) and are reported as [`LoadWarning`]s.

use nom::{
    IResult,
    bytes::complete::{tag, take_till1, take_while},
    combinator::opt,
};

use crate::error::{DbError, DbResult};

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Marker opening a block. Must start at column 0.
pub const START_MARKER: &str = "-- #{";

/// Marker closing a block. Must start at column 0.
pub const END_MARKER: &str = "-- #}";

/// Immutable mapping from statement key to statement text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTable {
    queries: BTreeMap<String, String>,
    warnings: Vec<LoadWarning>,
}

/// A lint diagnostic produced while loading a query file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    /// 1-based line number the warning refers to.
    pub line: usize,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// Tokens after the key on a start line were ignored.
    TrailingTokens { key: String, extra: String },
    /// A start marker appeared while `previous` was still open; its body was dropped.
    Reopened { previous: String },
    /// A start marker without a key. No block was opened.
    MissingKey,
    /// An end marker with no open block.
    StrayEnd,
    /// A later block replaced an earlier block with the same key.
    DuplicateKey { key: String },
    /// A block was still open at end of input and was dropped.
    Unterminated { key: String },
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::TrailingTokens { key, extra } => {
                write!(f, "ignored trailing tokens '{}' after key '{}'", extra, key)
            }
            WarningKind::Reopened { previous } => {
                write!(f, "block '{}' re-opened before its end marker; partial body discarded", previous)
            }
            WarningKind::MissingKey => write!(f, "start marker without a key"),
            WarningKind::StrayEnd => write!(f, "end marker without an open block"),
            WarningKind::DuplicateKey { key } => {
                write!(f, "duplicate key '{}' overrides an earlier block", key)
            }
            WarningKind::Unterminated { key } => {
                write!(f, "block '{}' has no end marker; discarded", key)
            }
        }
    }
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl QueryTable {
    /// Load a query file from disk.
    ///
    /// Fails with [`DbError::ResourceNotFound`] when the file cannot be read
    /// and [`DbError::Decode`] when it is not valid UTF-8.
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| DbError::ResourceNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        let text = std::str::from_utf8(&bytes).map_err(|source| DbError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let table = Self::parse(text);
        tracing::info!("Loaded {} queries from {}", table.len(), path.display());
        Ok(table)
    }

    /// Load a query file from any byte stream.
    pub fn from_reader<R: Read>(mut reader: R) -> DbResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let text = std::str::from_utf8(&bytes).map_err(|source| DbError::Decode {
            path: "<stream>".into(),
            source,
        })?;
        Ok(Self::parse(text))
    }

    /// Parse query file content in a single forward pass.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let text = normalize_newlines(text);

        let mut queries = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut body = String::new();
        // (key, line the block was opened on)
        let mut open: Option<(String, usize)> = None;

        for (idx, line) in text.split_inclusive('\n').enumerate() {
            let line_no = idx + 1;

            if let Ok((rest, key)) = start_marker(line) {
                if let Some((previous, _)) = open.take() {
                    warnings.push(LoadWarning {
                        line: line_no,
                        kind: WarningKind::Reopened { previous },
                    });
                }
                body.clear();

                match key {
                    Some(key) => {
                        let extra = rest.trim();
                        if !extra.is_empty() {
                            warnings.push(LoadWarning {
                                line: line_no,
                                kind: WarningKind::TrailingTokens {
                                    key: key.to_string(),
                                    extra: extra.to_string(),
                                },
                            });
                        }
                        open = Some((key.to_string(), line_no));
                    }
                    None => warnings.push(LoadWarning {
                        line: line_no,
                        kind: WarningKind::MissingKey,
                    }),
                }
            } else if line.starts_with(END_MARKER) {
                match open.take() {
                    Some((key, _)) => {
                        let sql = body.trim().to_string();
                        if queries.insert(key.clone(), sql).is_some() {
                            warnings.push(LoadWarning {
                                line: line_no,
                                kind: WarningKind::DuplicateKey { key },
                            });
                        }
                        body.clear();
                    }
                    None => warnings.push(LoadWarning {
                        line: line_no,
                        kind: WarningKind::StrayEnd,
                    }),
                }
            } else if open.is_some() {
                body.push_str(line);
            }
        }

        if let Some((key, opened_at)) = open {
            warnings.push(LoadWarning {
                line: opened_at,
                kind: WarningKind::Unterminated { key },
            });
        }

        for warning in &warnings {
            tracing::warn!("query file {}", warning);
        }

        Self { queries, warnings }
    }

    /// Look up a statement by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.queries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.queries.contains_key(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    /// `(key, statement)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.queries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Lint warnings collected while parsing.
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }
}

/// Recognize a start line, returning the key token (if any) and the rest of the line.
fn start_marker(line: &str) -> IResult<&str, Option<&str>> {
    let (rest, _) = tag(START_MARKER)(line)?;
    let (rest, _) = take_while(char::is_whitespace)(rest)?;
    opt(take_till1(char::is_whitespace))(rest)
}

/// `\r\n` and lone `\r` both end a line.
fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}
