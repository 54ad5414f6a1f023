use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ocr-scanner",
    version,
    about = "Extract form fields from scanned images and PDFs through an OCR backend"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract fields from images or a single PDF and merge them into one record.
    Extract(ExtractArgs),
    /// Check submitted values against a document.
    Verify(VerifyArgs),
    /// Ping the OCR backend.
    Health,
    /// List built-in field templates.
    Templates,
    #[command(subcommand)]
    History(HistoryCommand),
    /// Show the effective configuration.
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Treat the input as one PDF to split into pages.
    #[arg(long, default_value_t = false)]
    pub pdf: bool,

    #[arg(long)]
    pub language: Option<String>,

    /// Request these field ids instead of the language template.
    #[arg(long = "field")]
    pub fields: Vec<String>,

    #[arg(long = "custom-field")]
    pub custom_fields: Vec<String>,

    /// Correct a unified value, e.g. `--set Name=Alice`.
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub edits: Vec<String>,

    /// Show details for page N (1-based).
    #[arg(long)]
    pub show_page: Option<usize>,

    #[arg(long = "json")]
    pub json_out: Option<String>,

    #[arg(long = "xlsx")]
    pub xlsx_out: Option<String>,

    #[arg(long, default_value_t = false)]
    pub no_history: bool,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    pub file: PathBuf,

    /// JSON object of field -> submitted value.
    #[arg(long)]
    pub data: String,

    #[arg(long = "field")]
    pub fields: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    List {
        #[arg(long)]
        search: Option<String>,
    },
    Show {
        id: i64,
    },
    /// Correct stored values, e.g. `history set 3 Name=Alice`.
    Set {
        id: i64,
        #[arg(required = true, value_name = "FIELD=VALUE")]
        edits: Vec<String>,
    },
    Delete {
        id: i64,
    },
}
