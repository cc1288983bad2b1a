use serde::{Deserialize, Serialize};

use crate::annotators::base_annotator::{
    parse_feats, AnnotatedDocument, Annotator, Entity, Sentence, Token,
};
use crate::annotators::client::NlpServiceClient;
use crate::data_model::{AnnotationKind, DocumentRecord, Library};
use crate::error::Result;

/// Talks to a Stanza service that answers with `{"sentences": doc.to_dict(), "entities": [...]}`.
pub struct StanzaAnnotator {
    client: NlpServiceClient,
    language: String,
}

#[derive(Serialize)]
struct StanzaRequest<'a> {
    lang: &'a str,
    processors: String,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StanzaResponse {
    #[serde(default)]
    sentences: Vec<Vec<StanzaWord>>,
    #[serde(default)]
    entities: Vec<StanzaEntity>,
}

/// Multi-word tokens carry a `[start, end]` id range next to their syntactic words.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StanzaId {
    Word(usize),
    Range(Vec<usize>),
}

#[derive(Debug, Deserialize)]
struct StanzaWord {
    id: StanzaId,
    text: String,
    lemma: Option<String>,
    upos: Option<String>,
    xpos: Option<String>,
    feats: Option<String>,
    head: Option<usize>,
    deprel: Option<String>,
    start_char: Option<usize>,
    end_char: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct StanzaEntity {
    text: String,
    #[serde(rename = "type")]
    label: String,
    start_char: usize,
    end_char: usize,
}

impl StanzaAnnotator {
    pub fn new(client: NlpServiceClient, language: impl Into<String>) -> Self {
        StanzaAnnotator {
            client,
            language: language.into(),
        }
    }

    /// Processor list for one kind. English models ship without an MWT expander.
    pub fn processors_for(language: &str, kind: AnnotationKind) -> String {
        let specific = match kind {
            AnnotationKind::Entities => "ner",
            AnnotationKind::PartOfSpeech | AnnotationKind::Morphology => "pos,lemma",
            AnnotationKind::DependencyParse => "pos,lemma,depparse",
        };
        if language == "en" {
            format!("tokenize,{}", specific)
        } else {
            format!("tokenize,mwt,{}", specific)
        }
    }
}

impl Annotator for StanzaAnnotator {
    fn library(&self) -> Library {
        Library::Stanza
    }

    fn annotate(&self, document: &DocumentRecord, kind: AnnotationKind) -> Result<AnnotatedDocument> {
        let request = StanzaRequest {
            lang: &self.language,
            processors: Self::processors_for(&self.language, kind),
            text: &document.text,
        };
        let response: StanzaResponse = self.client.post_json(&document.id, &request)?;
        Ok(convert_stanza_response(response))
    }
}

pub(crate) fn convert_stanza_response(response: StanzaResponse) -> AnnotatedDocument {
    let entities = response
        .entities
        .into_iter()
        .map(|e| Entity {
            text: e.text,
            label: e.label,
            start_char: e.start_char,
            end_char: e.end_char,
        })
        .collect();

    let sentences = response
        .sentences
        .into_iter()
        .map(|words| Sentence {
            tokens: words
                .into_iter()
                .filter(|w| matches!(w.id, StanzaId::Word(_)))
                .map(|w| Token {
                    text: w.text,
                    lemma: w.lemma,
                    upos: w.upos,
                    xpos: w.xpos,
                    start_char: w.start_char,
                    end_char: w.end_char,
                    head: w.head.unwrap_or(0),
                    deprel: w.deprel,
                    feats: w.feats.as_deref().map(parse_feats).unwrap_or_default(),
                })
                .collect(),
        })
        .filter(|s: &Sentence| !s.tokens.is_empty())
        .collect();

    AnnotatedDocument {
        entities,
        sentences,
    }
}
