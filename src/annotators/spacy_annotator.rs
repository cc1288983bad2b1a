use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotators::base_annotator::{
    parse_feats, AnnotatedDocument, Annotator, Entity, Sentence, Token,
};
use crate::annotators::client::NlpServiceClient;
use crate::data_model::{AnnotationKind, DocumentRecord, Library};
use crate::error::{PipelineError, Result};

/// Talks to a spaCy service that answers with `Doc.to_json()`.
pub struct SpacyAnnotator {
    client: NlpServiceClient,
    model: String,
}

#[derive(Serialize)]
struct SpacyRequest<'a> {
    model: &'a str,
    text: &'a str,
    /// Pipeline components the service may skip for this request.
    disable: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpacyDoc {
    #[serde(default)]
    text: String,
    #[serde(default)]
    ents: Vec<SpacyEntity>,
    #[serde(default)]
    sents: Vec<SpacySpan>,
    #[serde(default)]
    tokens: Vec<SpacyToken>,
}

#[derive(Debug, Deserialize)]
struct SpacyEntity {
    start: usize,
    end: usize,
    label: String,
}

#[derive(Debug, Deserialize)]
struct SpacySpan {
    start: usize,
    end: usize,
}

#[derive(Debug, Deserialize)]
struct SpacyToken {
    id: usize,
    start: usize,
    end: usize,
    tag: Option<String>,
    pos: Option<String>,
    morph: Option<String>,
    lemma: Option<String>,
    dep: Option<String>,
    head: Option<usize>,
}

impl SpacyAnnotator {
    pub fn new(client: NlpServiceClient, model: impl Into<String>) -> Self {
        SpacyAnnotator {
            client,
            model: model.into(),
        }
    }

    /// `{language}_core_web_lg`, the model family the pipeline was tuned on.
    pub fn default_model(language: &str) -> String {
        format!("{}_core_web_lg", language)
    }

    fn disabled_components(kind: AnnotationKind) -> &'static [&'static str] {
        match kind {
            AnnotationKind::Entities => &["parser", "lemmatizer"],
            AnnotationKind::PartOfSpeech | AnnotationKind::Morphology => &["ner"],
            AnnotationKind::DependencyParse => &["ner"],
        }
    }
}

impl Annotator for SpacyAnnotator {
    fn library(&self) -> Library {
        Library::Spacy
    }

    fn annotate(&self, document: &DocumentRecord, kind: AnnotationKind) -> Result<AnnotatedDocument> {
        let request = SpacyRequest {
            model: &self.model,
            text: &document.text,
            disable: Self::disabled_components(kind),
        };
        let doc: SpacyDoc = self.client.post_json(&document.id, &request)?;
        let text = if doc.text.is_empty() {
            document.text.as_str()
        } else {
            doc.text.as_str()
        };
        convert_spacy_doc(&document.id, text, &doc)
    }
}

/// Character-offset slice; spaCy reports offsets in characters, not bytes.
fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

pub(crate) fn convert_spacy_doc(
    document_id: &str,
    text: &str,
    doc: &SpacyDoc,
) -> Result<AnnotatedDocument> {
    let entities = doc
        .ents
        .iter()
        .map(|ent| Entity {
            text: char_slice(text, ent.start, ent.end),
            label: ent.label.clone(),
            start_char: ent.start,
            end_char: ent.end,
        })
        .collect();

    // Without a parser there are no sentence spans; treat the document as one sentence.
    let spans: Vec<(usize, usize)> = if doc.sents.is_empty() {
        vec![(0, usize::MAX)]
    } else {
        doc.sents.iter().map(|s| (s.start, s.end)).collect()
    };

    let mut sentences = Vec::with_capacity(spans.len());
    for (sent_start, sent_end) in spans {
        let members: Vec<&SpacyToken> = doc
            .tokens
            .iter()
            .filter(|t| t.start >= sent_start && t.start < sent_end)
            .collect();
        let positions: HashMap<usize, usize> = members
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.id, idx + 1))
            .collect();

        let mut tokens = Vec::with_capacity(members.len());
        for t in members {
            let is_root = t.head.map_or(true, |h| h == t.id)
                || t.dep.as_deref().is_some_and(|d| d.eq_ignore_ascii_case("root"));
            let head = if is_root {
                0
            } else {
                let head_id = t.head.unwrap_or(t.id);
                *positions.get(&head_id).ok_or_else(|| PipelineError::AnnotationError {
                    document_id: document_id.to_string(),
                    reason: format!(
                        "token {} points at head {} outside its sentence",
                        t.id, head_id
                    ),
                })?
            };
            tokens.push(Token {
                text: char_slice(text, t.start, t.end),
                lemma: t.lemma.clone(),
                upos: t.pos.clone(),
                xpos: t.tag.clone(),
                start_char: Some(t.start),
                end_char: Some(t.end),
                head,
                deprel: t.dep.clone(),
                feats: t.morph.as_deref().map(parse_feats).unwrap_or_default(),
            });
        }
        if !tokens.is_empty() {
            sentences.push(Sentence { tokens });
        }
    }

    debug!(
        document_id,
        sentences = sentences.len(),
        "Converted spaCy document"
    );
    Ok(AnnotatedDocument {
        entities,
        sentences,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC_JSON: &str = r#"{
        "text": "Søren bor i Aarhus. Han løber.",
        "ents": [{"start": 0, "end": 5, "label": "PER"}, {"start": 12, "end": 18, "label": "LOC"}],
        "sents": [{"start": 0, "end": 19}, {"start": 20, "end": 30}],
        "tokens": [
            {"id": 0, "start": 0, "end": 5, "tag": "PROPN", "pos": "PROPN", "morph": "", "lemma": "Søren", "dep": "nsubj", "head": 1},
            {"id": 1, "start": 6, "end": 9, "tag": "VERB", "pos": "VERB", "morph": "Mood=Ind|Tense=Pres|VerbForm=Fin", "lemma": "bo", "dep": "ROOT", "head": 1},
            {"id": 2, "start": 10, "end": 11, "tag": "ADP", "pos": "ADP", "morph": "", "lemma": "i", "dep": "case", "head": 3},
            {"id": 3, "start": 12, "end": 18, "tag": "PROPN", "pos": "PROPN", "morph": "", "lemma": "Aarhus", "dep": "obl", "head": 1},
            {"id": 4, "start": 18, "end": 19, "tag": "PUNCT", "pos": "PUNCT", "morph": "", "lemma": ".", "dep": "punct", "head": 1},
            {"id": 5, "start": 20, "end": 23, "tag": "PRON", "pos": "PRON", "morph": "Case=Nom|PronType=Prs", "lemma": "han", "dep": "nsubj", "head": 6},
            {"id": 6, "start": 24, "end": 29, "tag": "VERB", "pos": "VERB", "morph": "Tense=Pres", "lemma": "løbe", "dep": "ROOT", "head": 6},
            {"id": 7, "start": 29, "end": 30, "tag": "PUNCT", "pos": "PUNCT", "morph": "", "lemma": ".", "dep": "punct", "head": 6}
        ]
    }"#;

    #[test]
    fn test_convert_entities_use_char_offsets() {
        let doc: SpacyDoc = serde_json::from_str(DOC_JSON).unwrap();
        let converted = convert_spacy_doc("d1", &doc.text, &doc).unwrap();
        assert_eq!(converted.entities.len(), 2);
        assert_eq!(converted.entities[0].text, "Søren");
        assert_eq!(converted.entities[1].text, "Aarhus");
        assert_eq!(converted.entities[1].label, "LOC");
    }

    #[test]
    fn test_convert_sentences_and_heads() {
        let doc: SpacyDoc = serde_json::from_str(DOC_JSON).unwrap();
        let converted = convert_spacy_doc("d1", &doc.text, &doc).unwrap();
        assert_eq!(converted.sentences.len(), 2);

        let first = &converted.sentences[0].tokens;
        assert_eq!(first.len(), 5);
        assert_eq!(first[0].head, 2);
        assert!(first[1].is_root());
        assert_eq!(first[3].head, 2);
        assert_eq!(first[1].feats.get("Tense").map(String::as_str), Some("Pres"));

        let second = &converted.sentences[1].tokens;
        assert_eq!(second[0].text, "Han");
        assert_eq!(second[0].head, 2, "heads are renumbered within the sentence");
        assert!(second[1].is_root());
    }

    #[test]
    fn test_missing_sents_is_one_sentence() {
        let doc: SpacyDoc = serde_json::from_str(
            r#"{"text": "Hej med dig", "tokens": [
                {"id": 0, "start": 0, "end": 3, "pos": "INTJ"},
                {"id": 1, "start": 4, "end": 7, "pos": "ADP"},
                {"id": 2, "start": 8, "end": 11, "pos": "PRON"}
            ]}"#,
        )
        .unwrap();
        let converted = convert_spacy_doc("d1", &doc.text, &doc).unwrap();
        assert_eq!(converted.sentences.len(), 1);
        assert_eq!(converted.sentences[0].tokens.len(), 3);
        assert!(converted.entities.is_empty());
    }

    #[test]
    fn test_head_outside_sentence_is_an_error() {
        let doc: SpacyDoc = serde_json::from_str(
            r#"{"text": "A. B.", "sents": [{"start": 0, "end": 2}, {"start": 3, "end": 5}],
                "tokens": [
                    {"id": 0, "start": 0, "end": 1, "dep": "nsubj", "head": 2},
                    {"id": 1, "start": 1, "end": 2, "dep": "punct", "head": 0},
                    {"id": 2, "start": 3, "end": 4, "dep": "ROOT", "head": 2}
                ]}"#,
        )
        .unwrap();
        let result = convert_spacy_doc("bad", &doc.text, &doc);
        assert!(matches!(
            result,
            Err(PipelineError::AnnotationError { ref document_id, .. }) if document_id == "bad"
        ));
    }

    #[test]
    fn test_default_model() {
        assert_eq!(SpacyAnnotator::default_model("da"), "da_core_web_lg");
    }
}
