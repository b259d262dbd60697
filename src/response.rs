//! The `{success, data | error, timestamp}` envelope shared by both services.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    // `default` would add a `T: Default` bound. Missing options read as `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>, code: Option<String>, details: Option<Value>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                message: message.into(),
                code,
                details,
            }),
            timestamp: Utc::now(),
        }
    }
}

pub fn success<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::ok(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_omits_error() {
        let value = serde_json::to_value(ApiResponse::ok(serde_json::json!({"x": 1}))).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["x"], 1);
        assert!(value.get("error").is_none());
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_failure_envelope_round_trips_code() {
        let body: ApiResponse<()> =
            ApiResponse::failure("nope", Some("MIXTRAL_UNAVAILABLE".into()), None);
        let text = serde_json::to_string(&body).unwrap();
        let parsed: ApiResponse<Value> = serde_json::from_str(&text).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error.unwrap().code.as_deref(), Some("MIXTRAL_UNAVAILABLE"));
    }

    #[derive(Debug, Deserialize)]
    struct Payload {
        count: usize,
    }

    #[test]
    fn test_deserializes_payload_without_default() {
        let ok: ApiResponse<Payload> =
            serde_json::from_str(r#"{"success":true,"data":{"count":3}}"#).unwrap();
        assert_eq!(ok.data.unwrap().count, 3);

        let failed: ApiResponse<Payload> = serde_json::from_str(
            r#"{"success":false,"error":{"message":"down","code":"MIXTRAL_UNAVAILABLE"}}"#,
        )
        .unwrap();
        assert!(failed.data.is_none());
        assert_eq!(failed.error.unwrap().message, "down");
    }
}
