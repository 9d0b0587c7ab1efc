//! Read-only query guard.
//!
//! A conservative textual denylist run before any free-text SQL leaves the
//! process. It strips comments, then looks for write-capable keywords as whole
//! words, case-insensitively, in a fixed order and stops at the first hit.
//! Word boundaries are ASCII: only `[0-9A-Za-z_]` counts as part of a word, so
//! a keyword next to `é` or a zero-width joiner is still found.
//!
//! # Known weakness
//!
//! This is not a SQL parser. String literal contents and quoted identifiers
//! are scanned like any other text, so `WHERE name = 'DELETE'` is rejected,
//! while an obfuscated or dynamically assembled statement is not caught. Treat
//! it as a guard rail in front of a read-only database role, not as a
//! security boundary.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::ClientError;

/// SQL operations that are never sent upstream, in scan order.
pub const BLOCKED_OPERATIONS: [&str; 13] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE", "MERGE", "CALL",
];

static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| compile(r"/\*[\s\S]*?\*/"));

static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| compile(r"--[^\n]*"));

/// One compiled whole-word matcher per blocked keyword, index-aligned with
/// [`BLOCKED_OPERATIONS`]. Boundaries are ASCII-only.
static BLOCKED_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    BLOCKED_OPERATIONS
        .iter()
        .map(|&op| (op, compile(&format!(r"(?i)(?-u:\b){op}(?-u:\b)"))))
        .collect()
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| unreachable!("invalid built-in pattern {pattern}: {e}"))
}

/// Checks that `sql` contains no write operation.
///
/// # Errors
///
/// Returns [`ClientError::BlockedOperationError`] naming the first keyword
/// from [`BLOCKED_OPERATIONS`] found outside comments.
///
/// # Examples
///
/// ```
/// use metabridge_client::guard::validate_read_only;
///
/// assert!(validate_read_only("SELECT * FROM users").is_ok());
/// assert!(validate_read_only("-- DELETE FROM users\nSELECT 1").is_ok());
/// assert!(validate_read_only("/* comment */ DELETE FROM users").is_err());
/// ```
pub fn validate_read_only(sql: &str) -> Result<(), ClientError> {
    match first_blocked_operation(sql) {
        Some(keyword) => {
            warn!(keyword, "blocked write query attempt");
            Err(ClientError::BlockedOperationError { keyword })
        }
        None => Ok(()),
    }
}

/// Returns the first blocked keyword present in `sql` once comments are removed.
#[must_use]
pub fn first_blocked_operation(sql: &str) -> Option<&'static str> {
    let cleaned = strip_comments(sql);
    BLOCKED_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&cleaned))
        .map(|(op, _)| *op)
}

/// Removes `/* ... */` and `-- ...` comments, each replaced by a single space
/// so adjacent tokens are never joined, and trims the result.
#[must_use]
pub fn strip_comments(sql: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(sql, " ");
    let without_lines = LINE_COMMENT.replace_all(&without_blocks, " ");
    without_lines.trim().to_string()
}
