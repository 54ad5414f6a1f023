use crate::error::ApiError;
use crate::quality::with_quality_report;
use crate::types::{ConfidenceMap, Detection, FieldMap, PageExtraction, SourceFile};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Renders a PDF into one image per page.
#[async_trait]
pub trait PageConverter: Send + Sync {
    /// Page images in page order. An empty vector is a valid (if useless) answer.
    async fn convert_to_images(&self, pdf: &SourceFile) -> Result<Vec<Vec<u8>>, ApiError>;
}

/// Runs template-driven field extraction on a single page image.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract_page(
        &self,
        file: &SourceFile,
        language: &str,
        field_ids: &[String],
    ) -> Result<PageExtraction, ApiError>;
}

/// HTTP client for the OCR backend.
pub struct OcrClient {
    client: Client,
    base_url: String,
}

impl OcrClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Cross-check user-submitted values against the document. Returns the raw verification document.
    pub async fn verify(
        &self,
        file: &SourceFile,
        submitted: &FieldMap,
        field_ids: &[String],
    ) -> Result<Value, ApiError> {
        let verification_data =
            serde_json::to_string(submitted).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let mut form = Form::new()
            .part("document", document_part(file)?)
            .text("verification_data", verification_data);
        if !field_ids.is_empty() {
            form = form.text("fields", fields_json(field_ids)?);
        }

        debug!(file = %file.name, fields = submitted.len(), "sending verification request");
        let response = self
            .client
            .post(self.url("/verify"))
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn health(&self) -> Result<Value, ApiError> {
        let response = self.client.get(self.url("/health")).send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl PageExtractor for OcrClient {
    async fn extract_page(
        &self,
        file: &SourceFile,
        language: &str,
        field_ids: &[String],
    ) -> Result<PageExtraction, ApiError> {
        let mut form = Form::new()
            .part("document", document_part(file)?)
            .text("include_detection", "true")
            .text("language", language.to_string());
        if !field_ids.is_empty() {
            form = form.text("fields", fields_json(field_ids)?);
        }

        debug!(file = %file.name, language, "sending extraction request");
        let response = self
            .client
            .post(self.url("/extract"))
            .multipart(form)
            .send()
            .await?;
        let body = read_json(response).await?;
        parse_extract_response(body)
    }
}

#[async_trait]
impl PageConverter for OcrClient {
    async fn convert_to_images(&self, pdf: &SourceFile) -> Result<Vec<Vec<u8>>, ApiError> {
        let form = Form::new().part("file", document_part(pdf)?);

        debug!(file = %pdf.name, "converting PDF pages to images");
        let response = self
            .client
            .post(self.url("/pdf/convert-to-images"))
            .multipart(form)
            .send()
            .await?;
        let body = read_json(response).await?;
        parse_convert_response(body)
    }
}

fn document_part(file: &SourceFile) -> Result<Part, ApiError> {
    Ok(Part::bytes(file.bytes.clone())
        .file_name(file.name.clone())
        .mime_str(&file.content_type)?)
}

fn fields_json(field_ids: &[String]) -> Result<String, ApiError> {
    serde_json::to_string(field_ids).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Status check plus JSON decode. Non-2xx bodies carrying `{error}` become `Backend` errors.
async fn read_json(response: Response) -> Result<Value, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if let Some(message) = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        {
            return Err(ApiError::Backend(message));
        }
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    mapped_fields: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    confidence_overlay: Option<String>,
    #[serde(default)]
    detections: Option<Vec<Detection>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    quality: Option<Value>,
}

pub(crate) fn parse_extract_response(body: Value) -> Result<PageExtraction, ApiError> {
    let resp: ExtractResponse =
        serde_json::from_value(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

    if let Some(error) = resp.error {
        return Err(ApiError::Backend(match resp.quality {
            Some(quality) => with_quality_report(&error, &quality),
            None => error,
        }));
    }

    let mut fields = FieldMap::new();
    let mut field_confidence = ConfidenceMap::new();
    for (k, v) in resp.mapped_fields.unwrap_or_default() {
        if let Some(score) = v.get("confidence").and_then(Value::as_f64) {
            field_confidence.insert(k.clone(), score);
        }
        fields.insert(k, mapped_value_to_string(&v));
    }

    let confidence_overlay = match resp.confidence_overlay.as_deref() {
        Some(s) if !s.trim().is_empty() => Some(decode_image_data(s)?),
        _ => None,
    };

    Ok(PageExtraction {
        fields,
        field_confidence,
        confidence_overlay,
        detections: resp.detections.unwrap_or_default(),
    })
}

/// Field values come back as plain strings, `{value, confidence}` objects, numbers, or null.
fn mapped_value_to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj.get("value").map(mapped_value_to_string).unwrap_or_default(),
        other => other.to_string(),
    }
}

pub(crate) fn parse_convert_response(body: Value) -> Result<Vec<Vec<u8>>, ApiError> {
    if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
        return Err(ApiError::Backend(error.to_string()));
    }
    let images = match body.get("images") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(_) => return Err(ApiError::InvalidResponse("images is not an array".into())),
    };
    images
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let s = item.as_str().ok_or_else(|| {
                ApiError::InvalidResponse(format!("page {} image is not a string", i + 1))
            })?;
            decode_image_data(s)
                .map_err(|_| ApiError::InvalidResponse(format!("Failed to convert page {} to image file", i + 1)))
        })
        .collect()
}

fn data_url_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^data:image/[^;]+;base64,").expect("valid regex"))
}

/// Decode base64 image data, with or without a `data:image/...;base64,` prefix.
pub fn decode_image_data(s: &str) -> Result<Vec<u8>, ApiError> {
    let raw = data_url_prefix().replace(s.trim(), "");
    BASE64
        .decode(raw.as_bytes())
        .map_err(|e| ApiError::InvalidResponse(format!("bad base64 image: {}", e)))
}
