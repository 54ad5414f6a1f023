use crate::error::{ApiError, VerifyError};
use crate::ocr::OcrClient;
use crate::types::{FieldMap, SourceFile};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Per-field comparison of a submitted value against the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCheck {
    #[serde(default)]
    pub submitted: Value,
    #[serde(default)]
    pub extracted: Option<Value>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, rename = "match")]
    pub matched: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "verified_fields")]
    pub fields: BTreeMap<String, FieldCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationReport {
    pub fn matched_count(&self) -> usize {
        self.fields.values().filter(|c| c.matched).count()
    }

    pub fn total(&self) -> usize {
        self.fields.len()
    }

    pub fn mismatches(&self) -> impl Iterator<Item = (&String, &FieldCheck)> {
        self.fields.iter().filter(|(_, c)| !c.matched)
    }

    pub fn summary(&self) -> String {
        match &self.error {
            Some(err) => format!("Verification failed: {}", err),
            None => format!("{}/{} fields match", self.matched_count(), self.total()),
        }
    }
}

/// Keep only entries the user actually filled in.
pub fn submitted_from_fields(fields: &FieldMap) -> FieldMap {
    fields
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawVerification {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    verified_fields: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<Value>,
}

/// Parse the backend's verification document, nested or not.
///
/// A failed verification reports its reason under `details.error`, or as a
/// string `error` entry in place of the field checks.
pub fn parse_verification(body: Value) -> Result<VerificationReport, ApiError> {
    let doc = match body.get("verification_result") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => body,
    };
    let raw: RawVerification =
        serde_json::from_value(doc).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

    let mut report = VerificationReport {
        success: raw.success,
        fields: BTreeMap::new(),
        error: raw.error,
    };
    for (field_id, entry) in raw.verified_fields.unwrap_or_default() {
        match entry {
            Value::Object(_) => {
                let check: FieldCheck = serde_json::from_value(entry).map_err(|e| {
                    ApiError::InvalidResponse(format!("field {}: {}", field_id, e))
                })?;
                report.fields.insert(field_id, check);
            }
            Value::String(message) if field_id == "error" => {
                report.success = false;
                if report.error.is_none() {
                    report.error = Some(message);
                }
            }
            other => debug!(field = %field_id, value = %other, "skipping unexpected verification entry"),
        }
    }

    if report.error.is_none() && !report.success {
        report.error = raw
            .details
            .as_ref()
            .and_then(|d| d.get("error"))
            .and_then(|e| e.as_str())
            .map(String::from);
    }
    Ok(report)
}

pub async fn verify_document(
    client: &OcrClient,
    file: &SourceFile,
    submitted: &FieldMap,
    field_ids: &[String],
) -> Result<VerificationReport, VerifyError> {
    let submitted = submitted_from_fields(submitted);
    if submitted.is_empty() {
        return Err(VerifyError::MissingData);
    }
    info!(file = %file.name, fields = submitted.len(), "verifying document");
    let body = client.verify(file, &submitted, field_ids).await?;
    let report = parse_verification(body)?;
    info!(summary = %report.summary(), "verification finished");
    Ok(report)
}
