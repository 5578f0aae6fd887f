use crate::document::{Element, TagCase};
use crate::schema::{Column, ColumnSource, Schema, Table};

use super::SqlValue;

/// One row bound for `table`, values in column declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<'s> {
    pub table: &'s Table,
    pub values: Vec<SqlValue>,
}

impl Row<'_> {
    /// Value of the named column, if the table has one.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        let index = self.table.columns.iter().position(|c| c.name == column)?;
        self.values.get(index)
    }
}

/// Per-document inputs to extraction.
#[derive(Debug, Clone, Copy)]
pub struct DocumentContext<'a> {
    pub doc_id: u64,
    pub filename: &'a str,
    pub tag_case: TagCase,
}

/// Turns document roots into rows for every table of a schema.
#[derive(Debug, Clone, Copy)]
pub struct RowExtractor<'s> {
    schema: &'s Schema,
}

impl<'s> RowExtractor<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        RowExtractor { schema }
    }

    /// All rows of one document, tables in schema order.
    pub fn extract(&self, doc_root: &Element, context: &DocumentContext<'_>) -> Vec<Row<'s>> {
        let mut rows = Vec::new();
        for table in &self.schema.tables {
            // One row per match, or a single row for the document itself
            let working: Vec<&Element> = match &table.for_each {
                Some(path) => path.for_case(context.tag_case).find_all(doc_root),
                None => vec![doc_root],
            };

            for (index, element) in working.into_iter().enumerate() {
                let values = table
                    .columns
                    .iter()
                    .map(|column| column_value(column, element, index + 1, context))
                    .collect();
                rows.push(Row { table, values });
            }
        }
        rows
    }
}

fn column_value(column: &Column, element: &Element, ordinal: usize, context: &DocumentContext<'_>) -> SqlValue {
    match &column.source {
        ColumnSource::DocId => SqlValue::clean(Some(&context.doc_id.to_string())),
        ColumnSource::ForEachIndex => SqlValue::clean(Some(&ordinal.to_string())),
        ColumnSource::Filename => SqlValue::clean(Some(context.filename)),
        ColumnSource::AutoGenerated => SqlValue::Null,
        ColumnSource::Element(path) => {
            let Some(found) = path.for_case(context.tag_case).find(element) else {
                return SqlValue::Null;
            };
            // Attribute values skip the extraction strategy
            match &column.attribute {
                Some(name) => SqlValue::clean(found.attribute(&context.tag_case.apply(name))),
                None => SqlValue::clean(column.extraction.apply(found).as_deref()),
            }
        }
    }
}
