//! Explicit table definition for the `operation` table.
//!
//! The definition is the single source of column names, SQL types,
//! nullability and constraints. Storage backends render DDL and query column
//! lists from it instead of reflecting over the record type.

use std::fmt::Write as _;

/// SQL type of a column as written in PostgreSQL DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing 32-bit integer.
    Serial,
    /// Variable-length string without a length limit.
    Varchar,
    /// Timestamp without time zone.
    Timestamp,
}

impl ColumnType {
    /// Returns the DDL keyword for this type.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            ColumnType::Serial => "SERIAL",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }
}

/// Table-level constraint attached to a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnConstraint {
    PrimaryKey,
    Unique,
}

/// Single column definition within a [`TableDef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub constraint: Option<ColumnConstraint>,
}

/// Table definition: a name and its columns in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

/// Column names of the `operation` table.
pub mod columns {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

/// The `operation` table.
pub const OPERATION_TABLE: TableDef = TableDef {
    name: "operation",
    columns: &[
        ColumnDef {
            name: columns::ID,
            column_type: ColumnType::Serial,
            nullable: false,
            constraint: Some(ColumnConstraint::PrimaryKey),
        },
        ColumnDef {
            name: columns::NAME,
            column_type: ColumnType::Varchar,
            nullable: false,
            constraint: Some(ColumnConstraint::Unique),
        },
        ColumnDef {
            name: columns::DESCRIPTION,
            column_type: ColumnType::Varchar,
            nullable: true,
            constraint: None,
        },
        ColumnDef {
            name: columns::CREATED_AT,
            column_type: ColumnType::Timestamp,
            nullable: false,
            constraint: None,
        },
        ColumnDef {
            name: columns::UPDATED_AT,
            column_type: ColumnType::Timestamp,
            nullable: true,
            constraint: None,
        },
    ],
};

impl TableDef {
    /// Comma-separated column list in declaration order, for `SELECT` and
    /// `RETURNING` clauses.
    #[must_use]
    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders an idempotent `CREATE TABLE` statement.
    ///
    /// Primary-key and unique constraints are emitted as table constraints
    /// after the column list.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut line = format!("    {} {}", c.name, c.column_type.as_sql());
                if !c.nullable {
                    line.push_str(" NOT NULL");
                }
                line
            })
            .collect();

        for column in self.columns {
            match column.constraint {
                Some(ColumnConstraint::PrimaryKey) => {
                    lines.push(format!("    PRIMARY KEY ({})", column.name));
                }
                Some(ColumnConstraint::Unique) => {
                    lines.push(format!("    UNIQUE ({})", column.name));
                }
                None => {}
            }
        }

        let mut sql = String::new();
        let _ = writeln!(sql, "CREATE TABLE IF NOT EXISTS {} (", self.name);
        sql.push_str(&lines.join(",\n"));
        sql.push_str("\n)");
        sql
    }

    /// Renders the statement that removes the table.
    #[must_use]
    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }
}
