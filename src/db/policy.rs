//! Per-table dump policies and the ordered set a dump run works through.

use crate::db::source::Value;
use crate::db::transform::{ColumnPolicy, ValueTransform};
use crate::error::{MaskdumpError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpMode {
    /// Recreate the table and dump its rows.
    #[default]
    Full,
    /// Recreate the table without rows.
    SchemaOnly,
    /// Dump rows into a table assumed to exist already.
    Partial,
}

impl DumpMode {
    pub fn dumps_data(self) -> bool {
        matches!(self, DumpMode::Full | DumpMode::Partial)
    }

    pub fn recreates_table(self) -> bool {
        matches!(self, DumpMode::Full | DumpMode::SchemaOnly)
    }
}

impl fmt::Display for DumpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpMode::Full => write!(f, "full"),
            DumpMode::SchemaOnly => write!(f, "schema only"),
            DumpMode::Partial => write!(f, "partial"),
        }
    }
}

/// The row-fetch query of one table, as shaped by a [`QueryCustomizer`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowQuery {
    pub filters: Vec<String>,
    /// Overrides the primary key as the pagination cursor.
    pub cursor: Option<Vec<String>>,
    /// Stop after this many rows in total.
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn filter(&mut self, condition: impl Into<String>) -> &mut Self {
        self.filters.push(condition.into());
        self
    }

    pub fn cursor<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cursor = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(&mut self, rows: usize) -> &mut Self {
        self.limit = Some(rows);
        self
    }
}

pub type QueryCustomizer = Arc<dyn Fn(&mut RowQuery) + Send + Sync>;
pub type ExtraSql = Arc<dyn Fn() -> String + Send + Sync>;

/// What to export for one table and how its columns are transformed.
#[derive(Clone)]
pub struct TableDumpPolicy {
    name: String,
    mode: DumpMode,
    query: Option<QueryCustomizer>,
    extra_sql: Option<ExtraSql>,
    columns: HashMap<String, ColumnPolicy>,
}

impl TableDumpPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: DumpMode::Full,
            query: None,
            extra_sql: None,
            columns: HashMap::new(),
        }
    }

    pub fn full_dump(mut self) -> Self {
        self.mode = DumpMode::Full;
        self
    }

    pub fn schema_only(mut self) -> Self {
        self.mode = DumpMode::SchemaOnly;
        self
    }

    pub fn partial_dump(mut self) -> Self {
        self.mode = DumpMode::Partial;
        self
    }

    pub fn query<F>(mut self, customizer: F) -> Self
    where
        F: Fn(&mut RowQuery) + Send + Sync + 'static,
    {
        self.query = Some(Arc::new(customizer));
        self
    }

    pub fn dump_sql<F>(mut self, extra: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.extra_sql = Some(Arc::new(extra));
        self
    }

    pub fn column(mut self, policy: ColumnPolicy) -> Self {
        self.columns.insert(policy.column().to_string(), policy);
        self
    }

    pub fn mask(self, column: &str, mask_char: char) -> Self {
        self.column(ColumnPolicy::mask(column, mask_char))
    }

    pub fn replace(self, column: &str, value: impl Into<Value>) -> Self {
        self.column(ColumnPolicy::replace(column, value))
    }

    pub fn replace_with<F>(self, column: &str, supplier: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.column(ColumnPolicy::new(column, ValueTransform::replace_with(supplier)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> DumpMode {
        self.mode
    }

    pub fn find_column(&self, column: &str) -> Option<&ColumnPolicy> {
        self.columns.get(column)
    }

    pub fn column_policies(&self) -> impl Iterator<Item = &ColumnPolicy> {
        self.columns.values()
    }

    /// The fetch query after the customizer, if any, has shaped it.
    pub fn row_query(&self) -> RowQuery {
        let mut query = RowQuery::default();
        if let Some(customize) = &self.query {
            customize(&mut query);
        }
        query
    }

    /// Extra SQL to emit ahead of the rows; empty when none is configured.
    pub fn extra_dump_sql(&self) -> String {
        self.extra_sql.as_ref().map(|f| f()).unwrap_or_default()
    }
}

impl fmt::Debug for TableDumpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDumpPolicy")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("query", &self.query.is_some())
            .field("extra_sql", &self.extra_sql.is_some())
            .field("columns", &self.columns)
            .finish()
    }
}

/// Tables to dump, in dump order.
#[derive(Debug, Clone, Default)]
pub struct DumpDefinitionSet {
    tables: Vec<TableDumpPolicy>,
}

impl DumpDefinitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, policy: TableDumpPolicy) -> Result<()> {
        if self.get(policy.name()).is_some() {
            return Err(MaskdumpError::DuplicateTable(policy.name().to_string()));
        }
        self.tables.push(policy);
        Ok(())
    }

    #[cfg(test)]
    pub fn with_table(mut self, policy: TableDumpPolicy) -> Result<Self> {
        self.insert(policy)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&TableDumpPolicy> {
        self.tables.iter().find(|t| t.name() == name)
    }

    pub fn tables(&self) -> &[TableDumpPolicy] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flags() {
        assert!(DumpMode::Full.dumps_data() && DumpMode::Full.recreates_table());
        assert!(!DumpMode::SchemaOnly.dumps_data() && DumpMode::SchemaOnly.recreates_table());
        assert!(DumpMode::Partial.dumps_data() && !DumpMode::Partial.recreates_table());
    }

    #[test]
    fn test_policy_builder() {
        let policy = TableDumpPolicy::new("users")
            .partial_dump()
            .mask("email", '*')
            .replace("ssn", "000-00-0000")
            .query(|q| {
                q.filter("active = 1").limit(10);
            })
            .dump_sql(|| "INSERT INTO audit VALUES (1);".to_string());

        assert_eq!(policy.mode(), DumpMode::Partial);
        assert!(policy.find_column("email").is_some());
        assert!(policy.find_column("name").is_none());
        assert_eq!(
            policy.row_query(),
            RowQuery {
                filters: vec!["active = 1".to_string()],
                cursor: None,
                limit: Some(10),
            }
        );
        assert_eq!(policy.extra_dump_sql(), "INSERT INTO audit VALUES (1);");
    }

    #[test]
    fn test_defaults() {
        let policy = TableDumpPolicy::new("posts");
        assert_eq!(policy.mode(), DumpMode::Full);
        assert_eq!(policy.row_query(), RowQuery::default());
        assert_eq!(policy.extra_dump_sql(), "");
    }

    #[test]
    fn test_definition_set_keeps_order_and_rejects_duplicates() {
        let mut set = DumpDefinitionSet::new()
            .with_table(TableDumpPolicy::new("c"))
            .and_then(|s| s.with_table(TableDumpPolicy::new("a")))
            .and_then(|s| s.with_table(TableDumpPolicy::new("b")))
            .unwrap();

        let names: Vec<_> = set.tables().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);

        let err = set.insert(TableDumpPolicy::new("a")).unwrap_err();
        assert!(matches!(err, MaskdumpError::DuplicateTable(name) if name == "a"));
        assert_eq!(set.len(), 3);
    }
}
