use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use TextAnalytics::config::{load_app_config, InputFormat};
use TextAnalytics::data_model::{AnnotationKind, Library};
use TextAnalytics::error::PipelineError;

fn create_temp_config_file(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(temp_file, "{}", content).expect("Failed to write to temp file");
    temp_file
}

#[test]
fn test_shipped_example_config_is_valid() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/config.yml");
    let config = load_app_config(&path).expect("config/config.yml should load");

    assert_eq!(config.annotation_kind().unwrap(), AnnotationKind::Entities);
    assert_eq!(config.library().unwrap(), Library::Stanza);
    assert_eq!(config.language, "da");
    assert_eq!(config.input.format, InputFormat::Csv);
    assert_eq!(
        config.destination().unwrap().table_id(),
        "my-gcp-project.text_analytics.speeches_stanza_named_entities"
    );
}

#[test]
fn test_spacy_dependency_parse_from_database() {
    let yaml = r#"
warehouse:
  project_name: research-1234
  dataset_name: parliament
  tablename: debates
  separate_tables_by_kind: false
input:
  from_database: true
  id_column: speech_id
  text_column: body
  table: raw_debates
processors:
  dependency_parse: true
libraries:
  spacy: true
language: en
annotator:
  spacy_model: en_core_web_sm
"#;
    let file = create_temp_config_file(yaml);
    let config = load_app_config(file.path()).expect("valid config");

    assert_eq!(config.annotation_kind().unwrap(), AnnotationKind::DependencyParse);
    assert_eq!(config.library().unwrap(), Library::Spacy);
    assert_eq!(config.input.source_table(&config.warehouse), "raw_debates");
    assert_eq!(config.annotator.spacy_model.as_deref(), Some("en_core_web_sm"));
    assert_eq!(config.chunking.min_chunk, 5000);
    assert_eq!(config.chunking.max_chunk, 10000);
    assert_eq!(
        config.destination().unwrap().table_id(),
        "research-1234.parliament.debates"
    );
}

#[test]
fn test_unknown_yaml_shape_is_config_error() {
    let file = create_temp_config_file("warehouse: [this, is, a, list]");
    match load_app_config(file.path()) {
        Err(PipelineError::ConfigError(msg)) => {
            assert!(msg.contains("Failed to parse config YAML"), "got: {}", msg)
        }
        other => panic!("Expected ConfigError, got {:?}", other),
    }
}

#[test]
fn test_invalid_selection_is_validation_error() {
    let yaml = r#"
warehouse:
  project_name: research-1234
  dataset_name: parliament
  tablename: debates
input:
  from_csv: true
  id_column: id
  text_column: text
processors:
  part_of_speech: true
  morphology: true
libraries:
  stanza: true
language: da
"#;
    let file = create_temp_config_file(yaml);
    assert!(matches!(
        load_app_config(file.path()),
        Err(PipelineError::ConfigValidationError(_))
    ));
}
