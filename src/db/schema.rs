//! Static table definitions and the DDL derived from them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    BigInt,
    Numeric,
    Boolean,
    TimestampTz,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::BigInt => "BIGINT",
            SqlType::Numeric => "NUMERIC",
            SqlType::Boolean => "BOOLEAN",
            SqlType::TimestampTz => "TIMESTAMPTZ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: SqlType,
    pub nullable: bool,
}

impl Column {
    pub const fn required(name: &'static str, ty: SqlType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, ty: SqlType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
        }
    }
}

/// A warehouse table: `schema.name`, its ordered columns and its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub schema: &'static str,
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Natural key; enforced only when the sink merges on key.
    pub key: &'static [&'static str],
}

impl TableSchema {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(self.schema), quote_ident(self.name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.to_string()).collect()
    }

    /// Non-key columns, the ones an upsert overwrites.
    pub fn value_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !self.key.contains(&c.name))
            .map(|c| c.name.to_string())
            .collect()
    }

    /// `CREATE SCHEMA` and `CREATE TABLE` statements, both `IF NOT EXISTS`.
    pub fn create_sql(&self, with_primary_key: bool) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("{} {}{}", quote_ident(c.name), c.ty.as_sql(), null)
            })
            .collect();

        if with_primary_key && !self.key.is_empty() {
            let key: Vec<String> = self.key.iter().map(|k| quote_ident(k)).collect();
            defs.push(format!("PRIMARY KEY ({})", key.join(", ")));
        }

        format!(
            "CREATE SCHEMA IF NOT EXISTS {};\nCREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            quote_ident(self.schema),
            self.qualified_name(),
            defs.join(",\n    ")
        )
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Wrap an identifier in double quotes to handle reserved keywords.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
