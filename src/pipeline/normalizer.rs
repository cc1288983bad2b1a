// src/pipeline/normalizer.rs

use crate::annotators::base_annotator::{AnnotatedDocument, Token};
use crate::data_model::{AnnotationKind, AnnotationRow, FieldValue};
use crate::error::{PipelineError, Result};
use crate::schema::{feature_column, MORPHOLOGY_FEATURES};

/// Relation written for sentence roots, whatever casing the library uses.
pub const ROOT_RELATION: &str = "ROOT";

/// Flattens one document's annotations into rows of the kind's schema.
///
/// A document with nothing to report yields an empty vector, not an error.
pub fn normalize(
    kind: AnnotationKind,
    identifier: &str,
    annotated: &AnnotatedDocument,
) -> Result<Vec<AnnotationRow>> {
    match kind {
        AnnotationKind::Entities => normalize_entities(identifier, annotated),
        AnnotationKind::PartOfSpeech => per_token(identifier, annotated, pos_row),
        AnnotationKind::DependencyParse => per_token(identifier, annotated, depparse_row),
        AnnotationKind::Morphology => per_token(identifier, annotated, morphology_row),
    }
}

fn normalize_entities(identifier: &str, annotated: &AnnotatedDocument) -> Result<Vec<AnnotationRow>> {
    annotated
        .entities
        .iter()
        .map(|ent| {
            Ok(AnnotationRow::builder(AnnotationKind::Entities)
                .set("identifier", identifier)?
                .set("text", ent.text.as_str())?
                .set("type", ent.label.as_str())?
                .set("start_char", ent.start_char)?
                .set("end_char", ent.end_char)?
                .build())
        })
        .collect()
}

/// Position of a token inside the document.
struct TokenRef<'a> {
    identifier: &'a str,
    sentence_num: usize,
    word_num: usize,
    token: &'a Token,
    sentence: &'a [Token],
}

impl TokenRef<'_> {
    fn word_id(&self, word_num: usize) -> String {
        format!("{}_{}_{}", self.identifier, self.sentence_num, word_num)
    }
}

fn per_token<F>(identifier: &str, annotated: &AnnotatedDocument, build: F) -> Result<Vec<AnnotationRow>>
where
    F: Fn(&TokenRef<'_>) -> Result<AnnotationRow>,
{
    let mut rows = Vec::new();
    for (s_idx, sentence) in annotated.sentences.iter().enumerate() {
        for (w_idx, token) in sentence.tokens.iter().enumerate() {
            rows.push(build(&TokenRef {
                identifier,
                sentence_num: s_idx + 1,
                word_num: w_idx + 1,
                token,
                sentence: &sentence.tokens,
            })?);
        }
    }
    Ok(rows)
}

fn opt_int(value: Option<usize>) -> FieldValue {
    value.map(FieldValue::from).unwrap_or(FieldValue::Null)
}

fn pos_row(t: &TokenRef<'_>) -> Result<AnnotationRow> {
    Ok(AnnotationRow::builder(AnnotationKind::PartOfSpeech)
        .set("identifier", t.identifier)?
        .set("sentence_num", t.sentence_num)?
        .set("word_num", t.word_num)?
        .set("word_id", t.word_id(t.word_num))?
        .set("word", t.token.text.as_str())?
        .set("lemma", t.token.lemma.clone())?
        .set("upos", t.token.upos.clone())?
        .set("xpos", t.token.xpos.clone())?
        .set("start_char", opt_int(t.token.start_char))?
        .set("end_char", opt_int(t.token.end_char))?
        .build())
}

fn depparse_row(t: &TokenRef<'_>) -> Result<AnnotationRow> {
    // Roots point at themselves so consumers can find them without a separate flag.
    let (relation, head_num, head) = if t.token.is_root() {
        (ROOT_RELATION.to_string(), t.word_num, t.token)
    } else {
        let head = t.sentence.get(t.token.head - 1).ok_or_else(|| {
            PipelineError::AnnotationError {
                document_id: t.identifier.to_string(),
                reason: format!(
                    "sentence {} word {} has head {} but the sentence has {} words",
                    t.sentence_num,
                    t.word_num,
                    t.token.head,
                    t.sentence.len()
                ),
            }
        })?;
        (
            t.token.deprel.clone().unwrap_or_default(),
            t.token.head,
            head,
        )
    };

    Ok(AnnotationRow::builder(AnnotationKind::DependencyParse)
        .set("identifier", t.identifier)?
        .set("sentence_num", t.sentence_num)?
        .set("word_num", t.word_num)?
        .set("word_id", t.word_id(t.word_num))?
        .set("word_text", t.token.text.as_str())?
        .set("word_lemma", t.token.lemma.clone())?
        .set("word_start_char", opt_int(t.token.start_char))?
        .set("word_end_char", opt_int(t.token.end_char))?
        .set("relation", relation)?
        .set("head_num", head_num)?
        .set("head_id", t.word_id(head_num))?
        .set("head_text", head.text.as_str())?
        .set("head_lemma", head.lemma.clone())?
        .set("head_start_char", opt_int(head.start_char))?
        .set("head_end_char", opt_int(head.end_char))?
        .build())
}

fn morphology_row(t: &TokenRef<'_>) -> Result<AnnotationRow> {
    let mut builder = AnnotationRow::builder(AnnotationKind::Morphology)
        .set("identifier", t.identifier)?
        .set("sentence_num", t.sentence_num)?
        .set("word_num", t.word_num)?
        .set("word_id", t.word_id(t.word_num))?
        .set("word", t.token.text.as_str())?
        .set("lemma", t.token.lemma.clone())?
        .set("start_char", opt_int(t.token.start_char))?
        .set("end_char", opt_int(t.token.end_char))?;
    for feature in MORPHOLOGY_FEATURES {
        builder = builder.set(&feature_column(feature), t.token.feats.get(feature).cloned())?;
    }
    Ok(builder.build())
}
