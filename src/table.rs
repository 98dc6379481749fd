// src/table.rs
//
// Table identifiers. A source table is a plain table plus the two columns the
// run reads from it.

use std::fmt;

use crate::constants::DEFAULT_DESTINATION_TABLE;
use crate::error::{EtlError, Result};

/// A schema-qualified table, rendered as `"schema"."name"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub schema: String,
    pub name: String,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.name` or `"schema"."name"`; every double quote is stripped.
    pub fn parse(input: &str) -> Result<Self> {
        let (schema, name) = input
            .split_once('.')
            .ok_or_else(|| EtlError::config(format!("table `{input}` must be schema.name")))?;
        let schema = schema.replace('"', "");
        let name = name.replace('"', "");
        if schema.trim().is_empty() || name.trim().is_empty() {
            return Err(EtlError::config(format!(
                "table `{input}` must name both a schema and a table"
            )));
        }
        Ok(Self::new(schema, name))
    }

    /// Destination for the parsed rows: the given identifier, or
    /// `parsed_names` in the source table's schema.
    pub fn destination_for(source: &Table, destination: Option<&str>) -> Result<Self> {
        match destination {
            Some(d) if !d.trim().is_empty() => Self::parse(d),
            _ => Ok(Self::new(source.schema.clone(), DEFAULT_DESTINATION_TABLE)),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\".\"{}\"", self.schema, self.name)
    }
}

/// Columns read from the source table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceColumns {
    pub primary_key: String,
    pub name_column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTable {
    pub table: Table,
    pub columns: SourceColumns,
}

impl SourceTable {
    pub fn new(table: Table, primary_key: impl Into<String>, name_column: impl Into<String>) -> Self {
        Self {
            table,
            columns: SourceColumns {
                primary_key: primary_key.into(),
                name_column: name_column.into(),
            },
        }
    }

    pub fn parse(input: &str, primary_key: &str, name_column: &str) -> Result<Self> {
        Ok(Self::new(Table::parse(input)?, primary_key, name_column))
    }

    pub fn schema(&self) -> &str {
        &self.table.schema
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn primary_key(&self) -> &str {
        &self.columns.primary_key
    }

    pub fn name_column(&self) -> &str {
        &self.columns.name_column
    }
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.table.fmt(f)
    }
}
