// src/annotators/mod.rs

pub mod base_annotator;
pub mod client;
pub mod spacy_annotator;
pub mod stanza_annotator;

pub use base_annotator::{AnnotatedDocument, Annotator, Entity, Sentence, Token};
pub use client::NlpServiceClient;
pub use spacy_annotator::SpacyAnnotator;
pub use stanza_annotator::StanzaAnnotator;
