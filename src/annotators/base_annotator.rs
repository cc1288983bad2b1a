use crate::data_model::{AnnotationKind, DocumentRecord, Library};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Library-agnostic annotation output for one document.
///
/// Every annotator converts its native output into this shape; the normalizer only ever
/// sees this form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
}

impl AnnotatedDocument {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.sentences.iter().all(|s| s.tokens.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
    pub start_char: usize,
    pub end_char: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub lemma: Option<String>,
    pub upos: Option<String>,
    pub xpos: Option<String>,
    pub start_char: Option<usize>,
    pub end_char: Option<usize>,
    /// 1-based index of the head token within the sentence; 0 marks the root.
    pub head: usize,
    pub deprel: Option<String>,
    #[serde(default)]
    pub feats: BTreeMap<String, String>,
}

impl Token {
    pub fn is_root(&self) -> bool {
        self.head == 0
    }
}

/// Splits a UD feature string (`Case=Nom|Number=Sing`) into a map. `_` and empty strings
/// mean no features.
pub fn parse_feats(raw: &str) -> BTreeMap<String, String> {
    raw.split('|')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect()
}

/// A document annotator backed by one NLP library.
pub trait Annotator {
    fn library(&self) -> Library;

    /// Runs the processors needed for `kind` over one document.
    fn annotate(&self, document: &DocumentRecord, kind: AnnotationKind) -> Result<AnnotatedDocument>;
}

impl<A: Annotator + ?Sized> Annotator for Box<A> {
    fn library(&self) -> Library {
        (**self).library()
    }

    fn annotate(&self, document: &DocumentRecord, kind: AnnotationKind) -> Result<AnnotatedDocument> {
        (**self).annotate(document, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feats() {
        let feats = parse_feats("Case=Nom|Number=Sing|PronType=Prs");
        assert_eq!(feats.len(), 3);
        assert_eq!(feats.get("Number").map(String::as_str), Some("Sing"));
        assert!(parse_feats("_").is_empty());
        assert!(parse_feats("").is_empty());
    }

    #[test]
    fn test_empty_document() {
        let doc = AnnotatedDocument {
            entities: vec![],
            sentences: vec![Sentence::default()],
        };
        assert!(doc.is_empty());
    }
}
