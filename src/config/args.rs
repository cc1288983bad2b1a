// --- Command-Line Arguments Struct ---
use clap::Parser;
use std::path::PathBuf;

/// Annotates a text corpus with spaCy or Stanza and loads the rows into BigQuery.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/config.yml")]
    pub config: PathBuf,

    /// Only load and validate the configuration, then exit
    #[arg(long)]
    pub validate_config: bool,

    /// Overrides `logging.dir` from the configuration file
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Optional: Port for the Prometheus metrics HTTP endpoint
    #[arg(long)]
    pub metrics_port: Option<u16>,
}
