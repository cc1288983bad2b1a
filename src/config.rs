// src/config.rs
use crate::data_model::{AnnotationKind, Library, WarehouseDestination};
use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub mod args;

static PROJECT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("valid project name regex"));
static DATASET_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid dataset name regex"));

/// The whole application configuration, read once at startup from YAML and passed
/// by reference to the readers, the executor and the table sink.
#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub input: InputConfig,
    pub processors: ProcessorSelection,
    pub libraries: LibrarySelection,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub annotator: AnnotatorConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WarehouseConfig {
    pub project_name: String,
    pub dataset_name: String,
    pub tablename: String,
    pub location: Option<String>, // e.g. "EU"; BigQuery picks the default when unset
    #[serde(default = "default_true")]
    pub separate_tables_by_kind: bool,
    pub api_base: Option<String>, // Override for emulators, defaults to the public endpoint
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Csv,
    Parquet,
}

impl InputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            InputFormat::Csv => "csv",
            InputFormat::Parquet => "parquet",
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct InputConfig {
    #[serde(default)]
    pub from_database: bool,
    #[serde(default)]
    pub from_csv: bool,
    pub id_column: String,
    pub text_column: String,
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default)]
    pub format: InputFormat,
    pub batch_size: Option<usize>, // Arrow batch size for file readers
    pub table: Option<String>,     // Source table when reading from the warehouse, defaults to warehouse.tablename
}


/// Which annotation kind to produce. Exactly one flag may be set.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProcessorSelection {
    #[serde(default)]
    pub named_entity_recognition: bool,
    #[serde(default)]
    pub part_of_speech: bool,
    #[serde(default)]
    pub dependency_parse: bool,
    #[serde(default)]
    pub morphology: bool,
}

impl ProcessorSelection {
    pub fn selected(&self) -> Result<AnnotationKind> {
        let flags = [
            (self.named_entity_recognition, AnnotationKind::Entities),
            (self.part_of_speech, AnnotationKind::PartOfSpeech),
            (self.dependency_parse, AnnotationKind::DependencyParse),
            (self.morphology, AnnotationKind::Morphology),
        ];
        exactly_one(&flags, "processor")
    }
}

/// Which NLP library to use. Exactly one flag may be set.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct LibrarySelection {
    #[serde(default)]
    pub spacy: bool,
    #[serde(default)]
    pub stanza: bool,
}

impl LibrarySelection {
    pub fn selected(&self) -> Result<Library> {
        let flags = [(self.spacy, Library::Spacy), (self.stanza, Library::Stanza)];
        exactly_one(&flags, "library")
    }
}

fn exactly_one<T: Copy + std::fmt::Debug>(flags: &[(bool, T)], what: &str) -> Result<T> {
    let chosen: Vec<T> = flags
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, value)| *value)
        .collect();
    match chosen.as_slice() {
        [one] => Ok(*one),
        [] => Err(PipelineError::ConfigValidationError(format!(
            "No {} selected. Please set exactly one {} to true.",
            what, what
        ))),
        many => Err(PipelineError::ConfigValidationError(format!(
            "More than one {} selected ({:?}). Please set only one to true.",
            what, many
        ))),
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_min_chunk")]
    pub min_chunk: usize,
    #[serde(default = "default_max_chunk")]
    pub max_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            min_chunk: default_min_chunk(),
            max_chunk: default_max_chunk(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct StagingConfig {
    #[serde(default = "default_staging_dir")]
    pub dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        StagingConfig {
            dir: default_staging_dir(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            dir: default_log_dir(),
            json: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AnnotatorConfig {
    #[serde(default = "default_spacy_endpoint")]
    pub spacy_endpoint: String,
    #[serde(default = "default_stanza_endpoint")]
    pub stanza_endpoint: String,
    pub spacy_model: Option<String>, // Defaults to `{language}_core_web_lg`
    #[serde(default = "default_annotator_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_annotator_max_retries")]
    pub max_retries: usize,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        AnnotatorConfig {
            spacy_endpoint: default_spacy_endpoint(),
            stanza_endpoint: default_stanza_endpoint(),
            spacy_model: None,
            timeout_seconds: default_annotator_timeout_seconds(),
            max_retries: default_annotator_max_retries(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_key_env_var")]
    pub env_var: String,
    #[serde(default = "default_key_dir")]
    pub key_dir: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        CredentialsConfig {
            env_var: default_key_env_var(),
            key_dir: default_key_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_language() -> String {
    "en".to_string()
}
fn default_timeout_seconds() -> f64 {
    60.0
}
fn default_job_poll_interval_ms() -> u64 {
    1000
}
fn default_input_dir() -> PathBuf {
    PathBuf::from("input_csv")
}
fn default_min_chunk() -> usize {
    5000
}
fn default_max_chunk() -> usize {
    10000
}
fn default_staging_dir() -> PathBuf {
    PathBuf::from("temp")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_spacy_endpoint() -> String {
    "http://localhost:8501/annotate".to_string()
}
fn default_stanza_endpoint() -> String {
    "http://localhost:8502/annotate".to_string()
}
fn default_annotator_timeout_seconds() -> f64 {
    120.0
}
fn default_annotator_max_retries() -> usize {
    3
}
fn default_key_env_var() -> String {
    "gbq_servicekey".to_string()
}
fn default_key_dir() -> PathBuf {
    PathBuf::from("access_key")
}

impl AppConfig {
    pub fn annotation_kind(&self) -> Result<AnnotationKind> {
        self.processors.selected()
    }

    pub fn library(&self) -> Result<Library> {
        self.libraries.selected()
    }

    /// Where this run's rows land.
    pub fn destination(&self) -> Result<WarehouseDestination> {
        Ok(WarehouseDestination {
            project: self.warehouse.project_name.clone(),
            dataset: self.warehouse.dataset_name.clone(),
            base_table: self.warehouse.tablename.clone(),
            library: self.library()?,
            kind: self.annotation_kind()?,
            separate_by_kind: self.warehouse.separate_tables_by_kind,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.annotation_kind()?;
        self.library()?;
        self.warehouse.validate()?;
        self.input.validate()?;
        self.chunking.validate()?;
        if self.language.trim().is_empty() {
            return Err(PipelineError::ConfigValidationError(
                "language cannot be empty".to_string(),
            ));
        }
        if self.annotator.timeout_seconds <= 0.0 {
            return Err(PipelineError::ConfigValidationError(format!(
                "annotator.timeout_seconds must be greater than 0, got {}",
                self.annotator.timeout_seconds
            )));
        }
        Ok(())
    }
}

impl WarehouseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.project_name.is_empty() {
            return Err(PipelineError::ConfigValidationError(
                "No project_name in config. Please enter a valid project name.".to_string(),
            ));
        }
        if !PROJECT_NAME_RE.is_match(&self.project_name) {
            return Err(PipelineError::ConfigValidationError(format!(
                "Invalid project_name '{}'. Project names may contain letters, numbers and dashes.",
                self.project_name
            )));
        }
        for (field, value) in [
            ("dataset_name", &self.dataset_name),
            ("tablename", &self.tablename),
        ] {
            if value.is_empty() {
                return Err(PipelineError::ConfigValidationError(format!(
                    "No {} in config. Please enter a valid name.",
                    field
                )));
            }
            if !DATASET_NAME_RE.is_match(value) {
                return Err(PipelineError::ConfigValidationError(format!(
                    "Invalid {} '{}'. Names may contain letters, numbers and underscores.",
                    field, value
                )));
            }
        }
        if self.timeout_seconds <= 0.0 {
            return Err(PipelineError::ConfigValidationError(format!(
                "warehouse.timeout_seconds must be greater than 0, got {}",
                self.timeout_seconds
            )));
        }
        Ok(())
    }
}

impl InputConfig {
    pub fn source_table<'a>(&'a self, warehouse: &'a WarehouseConfig) -> &'a str {
        self.table.as_deref().unwrap_or(&warehouse.tablename)
    }

    pub fn validate(&self) -> Result<()> {
        if self.from_database == self.from_csv {
            return Err(PipelineError::ConfigValidationError(
                "Exactly one of input.from_database and input.from_csv must be true".to_string(),
            ));
        }
        if self.id_column.is_empty() || self.text_column.is_empty() {
            return Err(PipelineError::ConfigValidationError(
                "input.id_column and input.text_column cannot be empty".to_string(),
            ));
        }
        if let Some(table) = &self.table {
            if !DATASET_NAME_RE.is_match(table) {
                return Err(PipelineError::ConfigValidationError(format!(
                    "Invalid input.table '{}'. Names may contain letters, numbers and underscores.",
                    table
                )));
            }
        }
        if let Some(0) = self.batch_size {
            return Err(PipelineError::ConfigValidationError(
                "input.batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_chunk == 0 {
            return Err(PipelineError::ConfigValidationError(
                "chunking.min_chunk must be greater than 0".to_string(),
            ));
        }
        if self.min_chunk > self.max_chunk {
            return Err(PipelineError::ConfigValidationError(format!(
                "chunking.min_chunk ({}) cannot be greater than chunking.max_chunk ({})",
                self.min_chunk, self.max_chunk
            )));
        }
        Ok(())
    }
}

/// Loads, parses and validates the application configuration YAML file.
pub fn load_app_config<P: AsRef<Path>>(config_path: P) -> Result<AppConfig> {
    let path_ref = config_path.as_ref();
    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        PipelineError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    let config: AppConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        PipelineError::ConfigError(format!(
            "Failed to parse config YAML from '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    config.validate()?;

    Ok(config)
}
