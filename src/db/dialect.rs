//! SQL dialect used to render dump statements and literals.

use crate::db::source::Value;
use serde::{Deserialize, Serialize};

/// Session-level checks switched off for the duration of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCheck {
    Autocommit,
    UniqueChecks,
    ForeignKeyChecks,
}

impl SessionCheck {
    pub const ALL: [SessionCheck; 3] = [
        SessionCheck::Autocommit,
        SessionCheck::UniqueChecks,
        SessionCheck::ForeignKeyChecks,
    ];

    pub fn variable(&self) -> &'static str {
        match self {
            SessionCheck::Autocommit => "AUTOCOMMIT",
            SessionCheck::UniqueChecks => "UNIQUE_CHECKS",
            SessionCheck::ForeignKeyChecks => "FOREIGN_KEY_CHECKS",
        }
    }
}

/// Statement and literal syntax of the dump's target engine.
///
/// Statements are returned without their trailing delimiter.
pub trait Dialect: Send + Sync {
    fn quote_ident(&self, name: &str) -> String;

    fn quote_string(&self, s: &str) -> String;

    fn quote_bytes(&self, bytes: &[u8]) -> String;

    /// Render a value as a SQL literal.
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Int(n) => n.to_string(),
            Value::UInt(n) => n.to_string(),
            Value::Float(n) if n.is_finite() => n.to_string(),
            Value::Float(_) => "NULL".to_string(),
            Value::Decimal(s) if is_plain_number(s) => s.clone(),
            Value::Decimal(s) | Value::Text(s) => self.quote_string(s),
            Value::Bytes(b) if b.is_empty() => self.quote_string(""),
            Value::Bytes(b) => self.quote_bytes(b),
        }
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_ident(table))
    }

    fn lock_table(&self, table: &str) -> Vec<String>;

    fn unlock_table(&self, table: &str) -> Vec<String>;

    fn set_check(&self, check: SessionCheck, enabled: bool) -> String;

    /// Session settings pinned for the whole replay, ahead of the checks.
    fn begin_session(&self) -> Vec<String> {
        Vec::new()
    }

    /// Restores what [`Dialect::begin_session`] changed.
    fn end_session(&self) -> Vec<String> {
        Vec::new()
    }
}

/// MySQL/MariaDB dialect.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }
}

/// Time zone the source session reads TIMESTAMP values in.
pub const DUMP_TIME_ZONE: &str = "+00:00";

impl Dialect for MysqlDialect {
    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_string(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for c in s.chars() {
            match c {
                '\0' => out.push_str("\\0"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\x08' => out.push_str("\\b"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '\x1a' => out.push_str("\\Z"),
                '\\' => out.push_str("\\\\"),
                _ => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    fn quote_bytes(&self, bytes: &[u8]) -> String {
        format!("0x{}", hex::encode(bytes))
    }

    fn lock_table(&self, table: &str) -> Vec<String> {
        let table = self.quote_ident(table);
        vec![
            format!("LOCK TABLES {} WRITE", table),
            format!("ALTER TABLE {} DISABLE KEYS", table),
        ]
    }

    fn unlock_table(&self, table: &str) -> Vec<String> {
        vec![
            format!("ALTER TABLE {} ENABLE KEYS", self.quote_ident(table)),
            "UNLOCK TABLES".to_string(),
        ]
    }

    fn set_check(&self, check: SessionCheck, enabled: bool) -> String {
        format!("SET {} = {}", check.variable(), u8::from(enabled))
    }

    fn begin_session(&self) -> Vec<String> {
        vec![
            "SET @OLD_TIME_ZONE = @@TIME_ZONE".to_string(),
            format!("SET TIME_ZONE = {}", self.quote_string(DUMP_TIME_ZONE)),
        ]
    }

    fn end_session(&self) -> Vec<String> {
        vec!["SET TIME_ZONE = @OLD_TIME_ZONE".to_string()]
    }
}

fn is_plain_number(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    !int_part.is_empty()
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}
