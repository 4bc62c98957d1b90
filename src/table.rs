use ahash::RandomState;
use indexmap::IndexSet;

use crate::error::{FlattenError, Result};
use crate::flattener::{Cell, FlatRow};

/// One named column and its value for every row.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Column-unified table: every column has exactly `num_rows` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    /// Assembles flat rows into a table.
    ///
    /// Pass one collects the union of column names in first-seen order,
    /// pass two materializes every row against that fixed set, filling the
    /// missing marker where a row lacks a column.
    pub fn build(rows: Vec<FlatRow>) -> Self {
        let mut names: IndexSet<&str, RandomState> = IndexSet::default();
        for row in &rows {
            names.extend(row.keys().map(String::as_str));
        }
        let names: Vec<String> = names.into_iter().map(str::to_string).collect();

        let num_rows = rows.len();
        let mut columns: Vec<Column> = names
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(num_rows)))
            .collect();

        for mut row in rows {
            for column in &mut columns {
                column.values.push(row.swap_remove(&column.name).flatten());
            }
        }

        tracing::debug!(rows = num_rows, columns = columns.len(), "table assembled");
        Self { columns, num_rows }
    }

    /// Builds a table from explicit columns, rejecting duplicate names and
    /// ragged lengths.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map(|c| c.values.len()).unwrap_or(0);

        let mut seen: IndexSet<&str, RandomState> = IndexSet::default();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(FlattenError::SchemaConflict(format!(
                    "duplicate column `{}`",
                    column.name
                )));
            }
            if column.values.len() != num_rows {
                return Err(FlattenError::SchemaConflict(format!(
                    "column `{}` has {} values, expected {}",
                    column.name,
                    column.values.len(),
                    num_rows
                )));
            }
        }

        Ok(Self { columns, num_rows })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    // Callers rewrite values in place; names, order and lengths must not change.
    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
