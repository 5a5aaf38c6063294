use crate::db::dialect::Dialect;
use crate::db::policy::TableDumpPolicy;
use crate::db::source::Row;
use crate::error::{MaskdumpError, Result};

/// Turns fetched rows into VALUES tuples and multi-row INSERT statements.
pub struct RowSerializer<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> RowSerializer<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Apply the table's column transforms and render each value as a literal, in the
    /// row's column order.
    pub fn serialize(&self, row: Row, policy: &TableDumpPolicy) -> Vec<String> {
        let (columns, values) = row.into_parts();
        columns
            .iter()
            .zip(values)
            .map(|(column, raw)| {
                let value = match policy.find_column(column) {
                    Some(column_policy) => column_policy.apply(raw),
                    None => raw,
                };
                self.dialect.literal(&value)
            })
            .collect()
    }

    pub fn tuple(&self, row: Row, policy: &TableDumpPolicy) -> String {
        format!("({})", self.serialize(row, policy).join(", "))
    }

    /// One INSERT for the whole chunk, using the column order of its first row.
    /// Returns `None` for an empty chunk.
    pub fn insert_statement(
        &self,
        policy: &TableDumpPolicy,
        rows: Vec<Row>,
    ) -> Result<Option<String>> {
        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let columns = first.columns().to_vec();
        let column_list = columns
            .iter()
            .map(|c| self.dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            if row.columns() != columns.as_slice() {
                return Err(MaskdumpError::catalog(
                    policy.name(),
                    "row columns differ from the first row of the chunk",
                ));
            }
            tuples.push(self.tuple(row, policy));
        }

        Ok(Some(format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.dialect.quote_ident(policy.name()),
            column_list,
            tuples.join(", ")
        )))
    }
}
