//! MySQL/MariaDB source: schema lookups and keyset-paginated row reads over one
//! dedicated connection.

use crate::config::redact_database_url;
use crate::db::dialect::{Dialect, MysqlDialect, DUMP_TIME_ZONE};
use crate::db::source::{ChunkRequest, DataSource, Row, SchemaCatalog, Value};
use crate::error::{MaskdumpError, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, Row as _, TypeInfo, ValueRef};
use std::sync::Arc;
use tracing::{debug, info};

/// Source reader bound to a single connection, so table locks and reads share a session.
pub struct MysqlSource {
    conn: MySqlConnection,
    database: String,
    dialect: MysqlDialect,
}

impl MysqlSource {
    pub async fn connect(url: &str) -> Result<Self> {
        let redacted = redact_database_url(url);
        let mut conn = MySqlConnection::connect(url)
            .await
            .map_err(|e| MaskdumpError::Connection(format!("{}: {}", redacted, e)))?;

        let database: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| MaskdumpError::Connection(format!("{}: {}", redacted, e)))?;
        let database = database.ok_or_else(|| {
            MaskdumpError::Config(format!("Database URL must name a database: {}", redacted))
        })?;

        // Session reads of TIMESTAMP columns must match the time zone the dump pins.
        conn.execute(format!("SET time_zone = '{}'", DUMP_TIME_ZONE).as_str())
            .await
            .map_err(|e| MaskdumpError::Connection(format!("{}: {}", redacted, e)))?;

        info!("Connected to MySQL source: {}", redacted);

        Ok(Self {
            conn,
            database,
            dialect: MysqlDialect::new(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| MaskdumpError::Connection(e.to_string()))
    }

    async fn column_names(&mut self, sql: &str, table: &str) -> Result<Vec<String>> {
        let rows: Vec<MySqlRow> = sqlx::query(sql)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| MaskdumpError::catalog(table, e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("COLUMN_NAME")
                    .map_err(|e| MaskdumpError::catalog(table, e))
            })
            .collect()
    }
}

/// Keyset-paginated SELECT for one chunk; cursor values are bound as parameters.
fn build_select(d: &MysqlDialect, request: &ChunkRequest<'_>) -> String {
    let mut sql = format!("SELECT * FROM {}", d.quote_ident(request.table));

    let mut conditions: Vec<String> = request
        .filters
        .iter()
        .map(|f| format!("({})", f))
        .collect();

    if request.after.is_some() {
        let cursor = request
            .cursor
            .iter()
            .map(|c| d.quote_ident(c))
            .collect::<Vec<_>>();
        if cursor.len() == 1 {
            conditions.push(format!("{} > ?", cursor[0]));
        } else {
            let placeholders = vec!["?"; cursor.len()];
            conditions.push(format!(
                "({}) > ({})",
                cursor.join(", "),
                placeholders.join(", ")
            ));
        }
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    let order = request
        .cursor
        .iter()
        .map(|c| d.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    sql.push_str(&format!(" ORDER BY {} LIMIT {}", order, request.limit));
    sql
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value.clone() {
        Value::Null => query.bind(None::<String>),
        Value::Int(n) => query.bind(n),
        Value::UInt(n) => query.bind(n),
        Value::Float(n) => query.bind(n),
        Value::Decimal(s) | Value::Text(s) => query.bind(s),
        Value::Bytes(b) => query.bind(b),
    }
}

/// Convert one column of a fetched row by its MySQL type name.
fn decode_value(row: &MySqlRow, idx: usize) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let value = match type_name.as_str() {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::Int(row.try_get::<i64, _>(idx)?)
        }
        t if t.ends_with("UNSIGNED") => Value::UInt(row.try_get::<u64, _>(idx)?),
        "YEAR" => Value::UInt(u64::from(row.try_get_unchecked::<u16, _>(idx)?)),
        "FLOAT" => Value::Decimal(row.try_get::<f32, _>(idx)?.to_string()),
        "DOUBLE" => Value::Float(row.try_get::<f64, _>(idx)?),
        "DECIMAL" => Value::Decimal(row.try_get_unchecked::<String, _>(idx)?),
        "DATE" | "DATETIME" | "TIMESTAMP" | "TIME" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
            let rendered = if type_name == "TIME" {
                render_time(&bytes)
            } else {
                render_temporal(&bytes, type_name == "DATE")
            };
            Value::Text(rendered.ok_or_else(|| {
                sqlx::Error::Decode(format!("malformed {} value", type_name).into())
            })?)
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        _ => match row.try_get_unchecked::<String, _>(idx) {
            Ok(s) => Value::Text(s),
            Err(_) => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        },
    };
    Ok(value)
}

/// Render a DATE/DATETIME/TIMESTAMP exactly as stored, zero parts included.
/// Text-protocol values arrive already formatted; binary ones are
/// `len, year(u16 LE), month, day[, hour, minute, second[, micros(u32 LE)]]`.
fn render_temporal(bytes: &[u8], date_only: bool) -> Option<String> {
    if bytes.first().is_some_and(u8::is_ascii_digit) {
        return String::from_utf8(bytes.to_vec()).ok();
    }

    let (len, body) = match bytes.split_first() {
        Some((&len, body)) => (usize::from(len), body),
        None => (0, bytes),
    };
    let body = body.get(..len)?;
    let mut parts = [0u32; 6];
    let mut micros = 0u32;
    if len >= 4 {
        parts[0] = u32::from(u16::from_le_bytes([body[0], body[1]]));
        parts[1] = u32::from(body[2]);
        parts[2] = u32::from(body[3]);
    }
    if len >= 7 {
        parts[3] = u32::from(body[4]);
        parts[4] = u32::from(body[5]);
        parts[5] = u32::from(body[6]);
    }
    if len >= 11 {
        micros = u32::from_le_bytes([body[7], body[8], body[9], body[10]]);
    }
    if !matches!(len, 0 | 4 | 7 | 11) {
        return None;
    }

    let [year, month, day, hour, minute, second] = parts;
    let date = format!("{:04}-{:02}-{:02}", year, month, day);
    if date_only {
        return Some(date);
    }
    let mut out = format!("{} {:02}:{:02}:{:02}", date, hour, minute, second);
    if micros > 0 {
        out.push_str(&format!(".{:06}", micros));
    }
    Some(out)
}

/// Render a TIME value, which may be negative or exceed 24 hours.
/// Binary layout: `len, negative, days(u32 LE), hour, minute, second[, micros(u32 LE)]`.
fn render_time(bytes: &[u8]) -> Option<String> {
    if bytes.first().is_some_and(|b| b.is_ascii_digit() || *b == b'-') {
        return String::from_utf8(bytes.to_vec()).ok();
    }

    let (len, body) = match bytes.split_first() {
        Some((&len, body)) => (usize::from(len), body),
        None => (0, bytes),
    };
    if len == 0 {
        return Some("00:00:00".to_string());
    }
    if len != 8 && len != 12 {
        return None;
    }
    let body = body.get(..len)?;
    let negative = body[0] == 1;
    let days = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
    let hours = days * 24 + u32::from(body[5]);
    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        if negative { "-" } else { "" },
        hours,
        body[6],
        body[7]
    );
    if len == 12 {
        let micros = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
        if micros > 0 {
            out.push_str(&format!(".{:06}", micros));
        }
    }
    Some(out)
}

fn convert_rows(rows: &[MySqlRow]) -> std::result::Result<Vec<Row>, sqlx::Error> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Arc<[String]> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    rows.iter()
        .map(|row| {
            let values = (0..columns.len())
                .map(|idx| decode_value(row, idx))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Row::new(Arc::clone(&columns), values))
        })
        .collect()
}

#[async_trait]
impl SchemaCatalog for MysqlSource {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        // CAST avoids VARBINARY results from INFORMATION_SCHEMA on MySQL 8
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| MaskdumpError::catalog(&self.database, e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("TABLE_NAME")
                    .map_err(|e| MaskdumpError::catalog(&self.database, e))
            })
            .collect()
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;
        self.column_names(query, table).await
    }

    async fn primary_key(&mut self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;
        self.column_names(query, table).await
    }

    async fn create_table_sql(&mut self, table: &str) -> Result<String> {
        let sql = format!("SHOW CREATE TABLE {}", self.dialect.quote_ident(table));
        let row: MySqlRow = sqlx::query(&sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| MaskdumpError::catalog(table, e))?;

        match row.try_get::<String, _>(1) {
            Ok(ddl) => Ok(ddl),
            Err(_) => row
                .try_get::<Vec<u8>, _>(1)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(|e| MaskdumpError::catalog(table, e)),
        }
    }
}

#[async_trait]
impl DataSource for MysqlSource {
    async fn fetch_chunk(&mut self, request: ChunkRequest<'_>) -> Result<Vec<Row>> {
        let sql = build_select(&self.dialect, &request);
        debug!("{}", sql);

        let mut query = sqlx::query(&sql);
        if let Some(after) = request.after {
            for value in after {
                query = bind_value(query, value);
            }
        }

        let rows: Vec<MySqlRow> = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| MaskdumpError::Connection(e.to_string()))?;

        convert_rows(&rows).map_err(|e| MaskdumpError::Connection(e.to_string()))
    }

    async fn lock_for_read(&mut self, table: &str) -> Result<()> {
        let sql = format!("LOCK TABLES {} READ", self.dialect.quote_ident(table));
        self.conn
            .execute(sql.as_str())
            .await
            .map_err(|e| MaskdumpError::Connection(e.to_string()))?;
        debug!("Locked source table {}", table);
        Ok(())
    }

    async fn unlock_all(&mut self) -> Result<()> {
        self.conn
            .execute("UNLOCK TABLES")
            .await
            .map_err(|e| MaskdumpError::Connection(e.to_string()))?;
        Ok(())
    }
}
