//! Collaborator seams consumed by the dump engine: the schema catalog, the row source, and
//! the scalar values they hand back.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A raw scalar read from the source database.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Fixed-point numbers keep the server's textual form to avoid rounding.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for the empty string and empty binary values.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Text(s) | Value::Decimal(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            _ => false,
        }
    }

    /// Length in characters as a mask sees it. Binary values count bytes.
    pub fn char_len(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Int(n) => n.to_string().len(),
            Value::UInt(n) => n.to_string().len(),
            Value::Float(n) => n.to_string().chars().count(),
            Value::Decimal(s) | Value::Text(s) => s.chars().count(),
            Value::Bytes(b) => b.len(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(n) => write!(f, "{}", n),
            Value::UInt(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Decimal(s) | Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One fetched record. Column names are shared by every row of a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn into_parts(self) -> (Arc<[String]>, Vec<Value>) {
        (self.columns, self.values)
    }
}

/// A request for the next chunk of a table, continuing after `after`.
#[derive(Debug, Clone)]
pub struct ChunkRequest<'a> {
    pub table: &'a str,
    /// Columns the rows are ordered by and the cursor continues on.
    pub cursor: &'a [String],
    /// Cursor values of the last row already emitted; `None` for the first chunk.
    pub after: Option<&'a [Value]>,
    /// Raw SQL conditions joined with AND.
    pub filters: &'a [String],
    pub limit: usize,
}

/// Structure lookups for the tables of the source database.
#[async_trait]
pub trait SchemaCatalog: Send {
    /// Base tables in catalog order.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    async fn table_columns(&mut self, table: &str) -> Result<Vec<String>>;

    /// Primary key columns in key order; empty when the table has none.
    async fn primary_key(&mut self, table: &str) -> Result<Vec<String>>;

    /// The dialect's CREATE TABLE text for `table`, without a trailing delimiter.
    async fn create_table_sql(&mut self, table: &str) -> Result<String>;
}

/// Cursor-paginated row access plus source-side locking.
#[async_trait]
pub trait DataSource: Send {
    async fn fetch_chunk(&mut self, request: ChunkRequest<'_>) -> Result<Vec<Row>>;

    /// Hold `table` against concurrent writers until [`DataSource::unlock_all`].
    async fn lock_for_read(&mut self, table: &str) -> Result<()>;

    async fn unlock_all(&mut self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory source used by the engine tests.

    use super::*;
    use crate::error::MaskdumpError;
    use std::cmp::Ordering;
    use std::collections::HashSet;

    #[derive(Debug, Clone)]
    pub struct MemoryTable {
        pub name: String,
        pub columns: Arc<[String]>,
        pub primary_key: Vec<String>,
        pub rows: Vec<Vec<Value>>,
    }

    impl MemoryTable {
        pub fn new(name: &str, columns: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                primary_key: vec![columns[0].to_string()],
                rows: Vec::new(),
            }
        }

        pub fn without_primary_key(mut self) -> Self {
            self.primary_key.clear();
            self
        }

        pub fn row(mut self, values: Vec<Value>) -> Self {
            self.rows.push(values);
            self
        }
    }

    #[derive(Debug, Default)]
    pub struct MemorySource {
        pub tables: Vec<MemoryTable>,
        pub fail_on_chunk: Option<(String, usize)>,
        pub locked: HashSet<String>,
        pub lock_history: Vec<String>,
        pub requests: Vec<(String, Option<Vec<Value>>, usize)>,
        fetched: Vec<(String, usize)>,
    }

    impl MemorySource {
        pub fn new(tables: Vec<MemoryTable>) -> Self {
            Self {
                tables,
                ..Default::default()
            }
        }

        fn table(&self, name: &str) -> Result<&MemoryTable> {
            self.tables
                .iter()
                .find(|t| t.name == name)
                .ok_or_else(|| MaskdumpError::UnknownTable(name.to_string()))
        }
    }

    fn compare(a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Text(x), Value::Text(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        }
    }

    #[async_trait]
    impl SchemaCatalog for MemorySource {
        async fn list_tables(&mut self) -> Result<Vec<String>> {
            Ok(self.tables.iter().map(|t| t.name.clone()).collect())
        }

        async fn table_columns(&mut self, table: &str) -> Result<Vec<String>> {
            Ok(self.table(table)?.columns.to_vec())
        }

        async fn primary_key(&mut self, table: &str) -> Result<Vec<String>> {
            Ok(self.table(table)?.primary_key.clone())
        }

        async fn create_table_sql(&mut self, table: &str) -> Result<String> {
            let t = self.table(table)?;
            Ok(format!(
                "CREATE TABLE `{}` ({})",
                t.name,
                t.columns
                    .iter()
                    .map(|c| format!("`{}` TEXT", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }
    }

    #[async_trait]
    impl DataSource for MemorySource {
        async fn fetch_chunk(&mut self, request: ChunkRequest<'_>) -> Result<Vec<Row>> {
            let chunk = self
                .fetched
                .iter()
                .filter(|(t, _)| t == request.table)
                .count()
                + 1;
            self.fetched.push((request.table.to_string(), chunk));
            self.requests.push((
                request.table.to_string(),
                request.after.map(<[Value]>::to_vec),
                request.limit,
            ));
            if let Some((table, at)) = &self.fail_on_chunk {
                if table == request.table && *at == chunk {
                    return Err(MaskdumpError::Connection("connection reset".to_string()));
                }
            }

            let t = self.table(request.table)?;
            let key_idx: Vec<usize> = request
                .cursor
                .iter()
                .map(|c| t.columns.iter().position(|n| n == c).unwrap())
                .collect();
            let key = |row: &Vec<Value>| -> Vec<Value> {
                key_idx.iter().map(|&i| row[i].clone()).collect()
            };
            let cmp_keys = |a: &[Value], b: &[Value]| {
                a.iter()
                    .zip(b)
                    .map(|(x, y)| compare(x, y))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            };

            let mut rows: Vec<&Vec<Value>> = t
                .rows
                .iter()
                .filter(|r| match request.after {
                    Some(after) => cmp_keys(&key(r), after) == Ordering::Greater,
                    None => true,
                })
                .collect();
            rows.sort_by(|a, b| cmp_keys(&key(a), &key(b)));

            Ok(rows
                .into_iter()
                .take(request.limit)
                .map(|r| Row::new(Arc::clone(&t.columns), r.clone()))
                .collect())
        }

        async fn lock_for_read(&mut self, table: &str) -> Result<()> {
            self.locked.insert(table.to_string());
            self.lock_history.push(format!("lock {}", table));
            Ok(())
        }

        async fn unlock_all(&mut self) -> Result<()> {
            self.locked.clear();
            self.lock_history.push("unlock".to_string());
            Ok(())
        }
    }
}
