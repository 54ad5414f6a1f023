pub mod aggregate;
pub mod batch;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ocr;
pub mod orchestrator;
pub mod quality;
pub mod resolver;
pub mod store;
pub mod templates;
pub mod types;
pub mod verify;

pub use aggregate::unify;
pub use batch::{Batch, BatchSummary};
pub use config::Config;
pub use error::{ApiError, AppError, PageError, ResolutionError, VerifyError};
pub use ocr::{OcrClient, PageConverter, PageExtractor};
pub use orchestrator::run_batch;
pub use resolver::resolve;
pub use store::{EditScope, ExtractionStore};
pub use types::{
    ConfidenceMap, Detection, FieldMap, PageExtraction, PageOutcome, PageResult, SourceFile,
    UnifiedRecord,
};
