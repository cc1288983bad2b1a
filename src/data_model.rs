use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::schema::schema_for;

/// One input document: a caller-supplied identifier and the text to annotate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String, // Must be unique per corpus, word ids are derived from it
    pub text: String,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        DocumentRecord {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// The four supported NLP output categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKind {
    Entities,
    PartOfSpeech,
    DependencyParse,
    Morphology,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 4] = [
        AnnotationKind::Entities,
        AnnotationKind::PartOfSpeech,
        AnnotationKind::DependencyParse,
        AnnotationKind::Morphology,
    ];

    /// Short processor name, used for staging files and log file names.
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationKind::Entities => "ner",
            AnnotationKind::PartOfSpeech => "pos",
            AnnotationKind::DependencyParse => "depparse",
            AnnotationKind::Morphology => "morphology",
        }
    }

    /// Suffix appended to the warehouse table name when tables are split by kind.
    pub fn table_suffix(&self) -> &'static str {
        match self {
            AnnotationKind::Entities => "named_entities",
            AnnotationKind::PartOfSpeech => "part_of_speech",
            AnnotationKind::DependencyParse => "depparse",
            AnnotationKind::Morphology => "morphology",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The NLP library producing the annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Library {
    Spacy,
    Stanza,
}

impl Library {
    pub fn name(&self) -> &'static str {
        match self {
            Library::Spacy => "spacy",
            Library::Stanza => "stanza",
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell of an output row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Str(String),
    Int(i64),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Str).unwrap_or(FieldValue::Null)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

/// One output record. Values are stored in the column order of the kind's schema,
/// so every row of a kind always carries every column (absent values are `Null`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRow {
    kind: AnnotationKind,
    values: Vec<FieldValue>,
}

impl AnnotationRow {
    /// Starts a row for `kind` with every column set to `Null`.
    pub fn builder(kind: AnnotationKind) -> RowBuilder {
        RowBuilder {
            kind,
            values: vec![FieldValue::Null; schema_for(kind).len()],
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        self.kind
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Looks a value up by column name.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        schema_for(self.kind)
            .index_of(column)
            .map(|idx| &self.values[idx])
    }

    /// Column names paired with values, in schema order.
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> + '_ {
        schema_for(self.kind)
            .columns()
            .iter()
            .map(|c| c.name)
            .zip(self.values.iter())
    }
}

pub struct RowBuilder {
    kind: AnnotationKind,
    values: Vec<FieldValue>,
}

impl RowBuilder {
    /// Sets a column by name. Unknown columns are a schema error rather than being dropped.
    pub fn set(mut self, column: &str, value: impl Into<FieldValue>) -> Result<Self> {
        let idx = schema_for(self.kind).index_of(column).ok_or_else(|| {
            PipelineError::SchemaMismatch(format!(
                "column '{}' is not part of the {} schema",
                column, self.kind
            ))
        })?;
        self.values[idx] = value.into();
        Ok(self)
    }

    pub fn build(self) -> AnnotationRow {
        AnnotationRow {
            kind: self.kind,
            values: self.values,
        }
    }
}

/// Rows accumulated for one flush. All rows share the batch's kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub kind: AnnotationKind,
    pub rows: Vec<AnnotationRow>,
    pub documents: usize, // Documents that contributed to this batch, including ones with zero rows
}

impl Batch {
    pub fn new(kind: AnnotationKind) -> Self {
        Batch {
            kind,
            rows: Vec::new(),
            documents: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Where a kind's rows land in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseDestination {
    pub project: String,
    pub dataset: String,
    pub base_table: String,
    pub library: Library,
    pub kind: AnnotationKind,
    pub separate_by_kind: bool,
}

impl WarehouseDestination {
    /// Effective table name: `{base}_{library}_{suffix}`, or `{base}` when kinds share a table.
    pub fn table_name(&self) -> String {
        if self.separate_by_kind {
            format!(
                "{}_{}_{}",
                self.base_table,
                self.library.name(),
                self.kind.table_suffix()
            )
        } else {
            self.base_table.clone()
        }
    }

    /// Fully qualified `project.dataset.table`.
    pub fn table_id(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination(separate_by_kind: bool) -> WarehouseDestination {
        WarehouseDestination {
            project: "my-project".to_string(),
            dataset: "nlp".to_string(),
            base_table: "speeches".to_string(),
            library: Library::Stanza,
            kind: AnnotationKind::PartOfSpeech,
            separate_by_kind,
        }
    }

    #[test]
    fn test_table_name_is_suffixed_by_library_and_kind() {
        let dest = destination(true);
        assert_eq!(dest.table_name(), "speeches_stanza_part_of_speech");
        assert_eq!(dest.table_id(), "my-project.nlp.speeches_stanza_part_of_speech");
    }

    #[test]
    fn test_table_name_without_kind_separation() {
        assert_eq!(destination(false).table_name(), "speeches");
    }

    #[test]
    fn test_row_builder_fills_missing_columns_with_null() {
        let row = AnnotationRow::builder(AnnotationKind::Entities)
            .set("identifier", "doc-1")
            .unwrap()
            .set("start_char", 4usize)
            .unwrap()
            .build();

        assert_eq!(row.values().len(), 5);
        assert_eq!(row.get("identifier"), Some(&FieldValue::Str("doc-1".into())));
        assert_eq!(row.get("start_char"), Some(&FieldValue::Int(4)));
        assert_eq!(row.get("type"), Some(&FieldValue::Null));
        assert_eq!(row.get("not_a_column"), None);
    }

    #[test]
    fn test_row_builder_rejects_unknown_column() {
        let result = AnnotationRow::builder(AnnotationKind::Entities).set("lemma", "x");
        assert!(matches!(result, Err(PipelineError::SchemaMismatch(_))));
    }
}
