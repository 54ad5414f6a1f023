use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Error message split from an embedded image-quality report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<Value>,
}

fn quality_report_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(Quality Report: (\{.*\})\)").expect("valid regex"))
}

/// Append a quality report to an error message in the form the backend's
/// clients have always shown it.
pub fn with_quality_report(message: &str, quality: &Value) -> String {
    format!("{} (Quality Report: {})", message, quality)
}

/// Split `"<message> (Quality Report: {...})"` into message and parsed report.
/// Anything that does not parse is returned whole with no report.
pub fn parse_error_message(message: &str) -> ErrorDetails {
    let whole = || ErrorDetails {
        message: message.to_string(),
        quality: None,
    };
    let Some(caps) = quality_report_re().captures(message) else {
        return whole();
    };
    let (Some(full), Some(json)) = (caps.get(0), caps.get(1)) else {
        return whole();
    };
    match serde_json::from_str::<Value>(json.as_str()) {
        Ok(quality) => {
            let mut main = String::with_capacity(message.len());
            main.push_str(&message[..full.start()]);
            main.push_str(&message[full.end()..]);
            ErrorDetails {
                message: main,
                quality: Some(quality),
            }
        }
        Err(_) => whole(),
    }
}

/// Improvement hints from a quality report, if it carries any.
pub fn suggestions(details: &ErrorDetails) -> Vec<String> {
    details
        .quality
        .as_ref()
        .and_then(|q| q.get("suggestions"))
        .and_then(|s| s.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_message_and_report() {
        let quality = json!({"score": 35, "suggestions": ["Image is very blurry."]});
        let msg = with_quality_report("Document quality too low", &quality);
        let details = parse_error_message(&msg);
        assert_eq!(details.message, "Document quality too low");
        assert_eq!(details.quality, Some(quality));
        assert_eq!(suggestions(&details), vec!["Image is very blurry.".to_string()]);
    }

    #[test]
    fn plain_message_passes_through() {
        let details = parse_error_message("timeout");
        assert_eq!(details.message, "timeout");
        assert!(details.quality.is_none());
        assert!(suggestions(&details).is_empty());
    }

    #[test]
    fn malformed_report_keeps_whole_message() {
        let msg = "Bad scan (Quality Report: {not json})";
        let details = parse_error_message(msg);
        assert_eq!(details.message, msg);
        assert!(details.quality.is_none());
    }
}
