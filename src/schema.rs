// Column definitions for every annotation kind. The normalizer, the staging writer
// and the warehouse load all read column lists from here and nowhere else.

use itertools::Itertools;

use crate::data_model::AnnotationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
}

impl ColumnType {
    /// BigQuery standard type name.
    pub fn warehouse_type(&self) -> &'static str {
        match self {
            ColumnType::String => "STRING",
            ColumnType::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnMode {
    Required,
    Nullable,
}

impl ColumnMode {
    pub fn warehouse_mode(&self) -> &'static str {
        match self {
            ColumnMode::Required => "REQUIRED",
            ColumnMode::Nullable => "NULLABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub mode: ColumnMode,
    pub description: &'static str,
}

impl Column {
    pub fn is_nullable(&self) -> bool {
        self.mode == ColumnMode::Nullable
    }
}

const fn string(name: &'static str, description: &'static str) -> Column {
    Column {
        name,
        column_type: ColumnType::String,
        mode: ColumnMode::Nullable,
        description,
    }
}

const fn integer(name: &'static str, description: &'static str) -> Column {
    Column {
        name,
        column_type: ColumnType::Integer,
        mode: ColumnMode::Nullable,
        description,
    }
}

const IDENTIFIER: Column = Column {
    name: "identifier",
    column_type: ColumnType::String,
    mode: ColumnMode::Required,
    description: "Identifier for the record",
};

/// Ordered columns for one annotation kind.
#[derive(Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    kind: AnnotationKind,
    columns: &'static [Column],
}

impl ColumnSchema {
    pub fn kind(&self) -> AnnotationKind {
        self.kind
    }

    pub fn columns(&self) -> &'static [Column] {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.columns.iter().map(|c| c.name)
    }

    /// The exact header line the staging file must start with.
    pub fn header_line(&self) -> String {
        self.column_names().join(",")
    }
}

/// Morphological features carried by the morphology table, in column order.
pub const MORPHOLOGY_FEATURES: [&str; 13] = [
    "Number", "Mood", "Person", "Tense", "VerbForm", "Case", "Gender", "PronType", "Degree",
    "Definite", "NumForm", "NumType", "Voice",
];

static ENTITY_COLUMNS: [Column; 5] = [
    IDENTIFIER,
    string("text", "Named entity text"),
    string("type", "Named entity type"),
    integer("start_char", "Location of start character of entity in input string"),
    integer("end_char", "Location of end character of entity in input string"),
];

static POS_COLUMNS: [Column; 10] = [
    IDENTIFIER,
    integer("sentence_num", "Sentence number"),
    integer("word_num", "Word number in the sentence"),
    string("word_id", "Word identifier"),
    string("word", "Word text"),
    string("lemma", "Lemma of the word"),
    string("upos", "Universal Part-of-Speech tag"),
    string("xpos", "Language-specific Part-of-Speech tag"),
    integer("start_char", "Start character position in text"),
    integer("end_char", "End character position in text"),
];

static DEPPARSE_COLUMNS: [Column; 15] = [
    IDENTIFIER,
    integer("sentence_num", "Sentence number"),
    integer("word_num", "Source word number in the sentence"),
    string("word_id", "Source word identifier"),
    string("word_text", "Source word text"),
    string("word_lemma", "Source word lemma"),
    integer("word_start_char", "Start character position in text"),
    integer("word_end_char", "End character position in text"),
    string("relation", "Dependency relation"),
    integer("head_num", "Target word number in the sentence"),
    string("head_id", "Target word identifier"),
    string("head_text", "Target word text"),
    string("head_lemma", "Target word lemma"),
    integer("head_start_char", "Target word start character position"),
    integer("head_end_char", "Target word end character position"),
];

static MORPHOLOGY_COLUMNS: [Column; 21] = [
    IDENTIFIER,
    integer("sentence_num", "Sentence number"),
    integer("word_num", "Word number in the sentence"),
    string("word_id", "Word identifier"),
    string("word", "Word text"),
    string("lemma", "Lemma of the word"),
    string("features_Number", "Number feature"),
    string("features_Mood", "Mood feature"),
    string("features_Person", "Person feature"),
    string("features_Tense", "Tense feature"),
    string("features_VerbForm", "Verb form feature"),
    string("features_Case", "Case feature"),
    string("features_Gender", "Gender feature"),
    string("features_PronType", "Pronoun type feature"),
    string("features_Degree", "Degree feature"),
    string("features_Definite", "Definite feature"),
    string("features_NumForm", "Number form feature"),
    string("features_NumType", "Number type feature"),
    string("features_Voice", "Voice feature"),
    integer("start_char", "Start character position in text"),
    integer("end_char", "End character position in text"),
];

static ENTITY_SCHEMA: ColumnSchema = ColumnSchema {
    kind: AnnotationKind::Entities,
    columns: &ENTITY_COLUMNS,
};

static POS_SCHEMA: ColumnSchema = ColumnSchema {
    kind: AnnotationKind::PartOfSpeech,
    columns: &POS_COLUMNS,
};

static DEPPARSE_SCHEMA: ColumnSchema = ColumnSchema {
    kind: AnnotationKind::DependencyParse,
    columns: &DEPPARSE_COLUMNS,
};

static MORPHOLOGY_SCHEMA: ColumnSchema = ColumnSchema {
    kind: AnnotationKind::Morphology,
    columns: &MORPHOLOGY_COLUMNS,
};

pub fn schema_for(kind: AnnotationKind) -> &'static ColumnSchema {
    match kind {
        AnnotationKind::Entities => &ENTITY_SCHEMA,
        AnnotationKind::PartOfSpeech => &POS_SCHEMA,
        AnnotationKind::DependencyParse => &DEPPARSE_SCHEMA,
        AnnotationKind::Morphology => &MORPHOLOGY_SCHEMA,
    }
}

/// Column name holding a morphological feature, e.g. `features_Tense`.
pub fn feature_column(feature: &str) -> String {
    format!("features_{}", feature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_schema_starts_with_required_identifier() {
        for kind in AnnotationKind::ALL {
            let schema = schema_for(kind);
            assert_eq!(schema.kind(), kind);
            let first = schema.columns()[0];
            assert_eq!(first.name, "identifier");
            assert_eq!(first.mode, ColumnMode::Required);
            assert!(schema.columns()[1..].iter().all(Column::is_nullable));
        }
    }

    #[test]
    fn test_column_names_are_unique() {
        for kind in AnnotationKind::ALL {
            let schema = schema_for(kind);
            let names: HashSet<_> = schema.column_names().collect();
            assert_eq!(names.len(), schema.len(), "duplicate column in {}", kind);
        }
    }

    #[test]
    fn test_schema_widths() {
        assert_eq!(schema_for(AnnotationKind::Entities).len(), 5);
        assert_eq!(schema_for(AnnotationKind::PartOfSpeech).len(), 10);
        assert_eq!(schema_for(AnnotationKind::DependencyParse).len(), 15);
        assert_eq!(schema_for(AnnotationKind::Morphology).len(), 21);
    }

    #[test]
    fn test_every_morphology_feature_has_a_column() {
        let schema = schema_for(AnnotationKind::Morphology);
        for feature in MORPHOLOGY_FEATURES {
            assert!(schema.index_of(&feature_column(feature)).is_some());
        }
    }

    #[test]
    fn test_header_line_follows_column_order() {
        assert_eq!(
            schema_for(AnnotationKind::Entities).header_line(),
            "identifier,text,type,start_char,end_char"
        );
    }
}
