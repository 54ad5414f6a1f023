use thiserror::Error;

/// Failures that stop a batch before any page is extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("no source files supplied")]
    EmptyInput,
    #[error("invalid source set: {0}")]
    InvalidInput(String),
    #[error("PDF conversion failed: {0}")]
    ConversionFailed(String),
}

/// Failure of a single page. Recorded on the page, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("{0}")]
    ExtractionFailed(String),
}

impl From<ApiError> for PageError {
    fn from(value: ApiError) -> Self {
        Self::ExtractionFailed(value.to_string())
    }
}

/// Errors at the HTTP boundary with the OCR backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("request failed ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Backend(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Network("Check your internet connection and try again.".to_string())
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Network(format!("Network error: {}", e))
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Please provide submitted data for verification.")]
    MissingData,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors surfaced by the application shell (storage, export, config).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("export error: {0}")]
    Export(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Database(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Export(value.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(value: rust_xlsxwriter::XlsxError) -> Self {
        Self::Export(value.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_error_keeps_backend_message_verbatim() {
        let err: PageError = ApiError::Backend("Image is severely blurred.".into()).into();
        assert_eq!(err.to_string(), "Image is severely blurred.");
    }

    #[test]
    fn status_error_mentions_code_and_body() {
        let err = ApiError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "request failed (502): bad gateway");
    }
}
