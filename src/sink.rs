//! Row destinations.

use std::io::Write;

use tracing::debug;

use crate::error::{Error, Result};
use crate::extract::{Row, SqlValue};
use crate::schema::Schema;

/// Destination for the schema definition and extracted rows.
///
/// Any error returned here is fatal for the run.
pub trait Sink {
    /// Create the database and its tables from scratch.
    fn define(&mut self, schema: &Schema) -> Result<()>;

    /// Continue writing into a database defined by an earlier run.
    fn attach(&mut self, _schema: &Schema) -> Result<()> {
        Ok(())
    }

    /// Highest document id already stored, `0` when there is none.
    fn high_water_mark(&mut self, schema: &Schema) -> Result<u64>;

    fn insert(&mut self, row: &Row<'_>) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes SQL statements, one per line, to any writer.
///
/// There is no database to ask for the high-water mark, so the caller
/// supplies it with [`SqlScriptSink::with_high_water_mark`].
pub struct SqlScriptSink<W: Write> {
    writer: W,
    high_water_mark: u64,
    statements: u64,
}

impl<W: Write> SqlScriptSink<W> {
    pub fn new(writer: W) -> Self {
        SqlScriptSink {
            writer,
            high_water_mark: 0,
            statements: 0,
        }
    }

    pub fn with_high_water_mark(mut self, high_water_mark: u64) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    /// Statements written so far.
    pub fn statements(&self) -> u64 {
        self.statements
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn statement(&mut self, sql: &str) -> Result<()> {
        writeln!(self.writer, "{sql}").map_err(|e| Error::Sink(format!("{e} while writing `{}`", preview(sql))))?;
        self.statements += 1;
        Ok(())
    }
}

fn preview(sql: &str) -> &str {
    match sql.char_indices().nth(60) {
        Some((end, _)) => &sql[..end],
        None => sql,
    }
}

impl<W: Write> Sink for SqlScriptSink<W> {
    fn define(&mut self, schema: &Schema) -> Result<()> {
        let db = &schema.database;
        self.statement(&format!("DROP DATABASE IF EXISTS {db};"))?;
        self.statement(&format!("CREATE DATABASE {db} CHARACTER SET \"utf8\";"))?;
        self.statement(&format!("USE {db};"))?;

        for table in &schema.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| {
                    let definition = format!("{} {} {}", c.name, c.sql_type, c.flags);
                    definition.trim_end().to_string()
                })
                .collect();
            self.statement(&format!("CREATE TABLE {} ({});", table.name, columns.join(", ")))?;
        }
        debug!(database = %db, tables = schema.tables.len(), "defined schema");
        Ok(())
    }

    fn attach(&mut self, schema: &Schema) -> Result<()> {
        self.statement(&format!("USE {};", schema.database))
    }

    fn high_water_mark(&mut self, _schema: &Schema) -> Result<u64> {
        Ok(self.high_water_mark)
    }

    fn insert(&mut self, row: &Row<'_>) -> Result<()> {
        let names: Vec<&str> = row.table.columns.iter().map(|c| c.name.as_str()).collect();
        let values: Vec<&str> = row.values.iter().map(SqlValue::as_sql).collect();
        self.statement(&format!(
            "INSERT INTO {} ({}) VALUES ({});",
            row.table.name,
            names.join(", "),
            values.join(", ")
        ))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| Error::Sink(e.to_string()))
    }
}

/// A row kept by [`RowCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedRow {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<SqlValue>,
}

impl CollectedRow {
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.values.get(index)
    }
}

/// Keeps everything in memory, for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct RowCollector {
    pub defined: Vec<String>,
    pub attached: bool,
    pub rows: Vec<CollectedRow>,
    high_water_mark: u64,
}

impl RowCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_high_water_mark(mut self, high_water_mark: u64) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    /// Rows written to `table`, in insertion order.
    pub fn rows_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a CollectedRow> + 'a {
        self.rows.iter().filter(move |r| r.table == table)
    }
}

impl Sink for RowCollector {
    fn define(&mut self, schema: &Schema) -> Result<()> {
        self.defined = schema.tables.iter().map(|t| t.name.clone()).collect();
        Ok(())
    }

    fn attach(&mut self, _schema: &Schema) -> Result<()> {
        self.attached = true;
        Ok(())
    }

    fn high_water_mark(&mut self, _schema: &Schema) -> Result<u64> {
        Ok(self.high_water_mark)
    }

    fn insert(&mut self, row: &Row<'_>) -> Result<()> {
        self.rows.push(CollectedRow {
            table: row.table.name.clone(),
            columns: row.table.columns.iter().map(|c| c.name.clone()).collect(),
            values: row.values.clone(),
        });
        Ok(())
    }
}
