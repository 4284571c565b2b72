use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            400 | 409 | 422 => ErrorCode::Validation,
            429 => ErrorCode::RateLimited,
            _ => ErrorCode::Internal,
        }
    }

    fn fallback_message(self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Phiên đăng nhập đã hết hạn. Vui lòng đăng nhập lại.",
            ErrorCode::Forbidden => "Bạn không có quyền thực hiện thao tác này.",
            ErrorCode::NotFound => "Không tìm thấy dữ liệu yêu cầu.",
            ErrorCode::Validation => "Dữ liệu không hợp lệ.",
            ErrorCode::RateLimited => "Quá nhiều yêu cầu. Vui lòng thử lại sau.",
            ErrorCode::Internal => "Đã xảy ra lỗi máy chủ. Vui lòng thử lại sau.",
        }
    }
}

/// A backend failure reduced to something a person can read.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_response(status: u16, body: &Value) -> Self {
        let code = ErrorCode::from_status(status);
        let message =
            flatten_error_body(body).unwrap_or_else(|| code.fallback_message().to_string());
        Self { code, message }
    }
}

/// Longest plain-text body shown to a user as-is.
const MAX_TEXT_MESSAGE: usize = 200;

/// Flattens the error bodies the backend produces into a single message.
///
/// Handles `{"detail": ..}` / `{"message": ..}`, field maps such as
/// `{"phone": ["invalid"], "name": ["required"]}`, arrays of
/// `{"message": ..}` objects, and short plain-text bodies. Scalars that are
/// not messages (error codes, field names) and markup are dropped. Returns
/// `None` when the body carries nothing readable.
pub fn flatten_error_body(body: &Value) -> Option<String> {
    match body {
        Value::Null | Value::Bool(_) | Value::Number(_) => None,
        Value::String(text) => readable_text(text),
        Value::Array(items) => non_empty(
            items
                .iter()
                .filter_map(flatten_error_body)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Value::Object(map) => {
            for key in ["detail", "message", "error"] {
                if let Some(text) = map.get(key).and_then(flatten_error_body) {
                    return Some(text);
                }
            }
            non_empty(
                map.values()
                    .filter_map(|value| match value {
                        Value::Array(parts) => non_empty(
                            parts
                                .iter()
                                .filter_map(flatten_error_body)
                                .collect::<Vec<_>>()
                                .join(", "),
                        ),
                        Value::Object(_) => flatten_error_body(value),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
    }
}

/// Keeps a single short line of plain text; HTML error pages and dumps are
/// not messages.
pub fn readable_text(text: &str) -> Option<String> {
    let text = text.trim();
    if text.starts_with('<')
        || text.contains('\n')
        || text.chars().count() > MAX_TEXT_MESSAGE
    {
        return None;
    }
    non_empty(text.to_string())
}

fn non_empty(message: String) -> Option<String> {
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn prefers_detail_field() {
        let body = json!({"detail": "Không tìm thấy hóa đơn", "code": "not_found"});
        assert_eq!(
            flatten_error_body(&body).as_deref(),
            Some("Không tìm thấy hóa đơn")
        );
    }

    #[test]
    fn joins_field_errors_per_field() {
        let body = json!({
            "contact_phone": ["Số điện thoại không hợp lệ", "Bắt buộc"],
        });
        assert_eq!(
            flatten_error_body(&body).as_deref(),
            Some("Số điện thoại không hợp lệ, Bắt buộc")
        );
    }

    #[test]
    fn joins_array_of_message_objects_with_newlines() {
        let body = json!([{"message": "a"}, {"message": "b"}, "c"]);
        assert_eq!(flatten_error_body(&body).as_deref(), Some("a\nb\nc"));
    }

    #[test]
    fn objects_without_messages_fall_back_to_status_text() {
        let body = json!([{"field": "phone", "code": "invalid"}]);
        assert_eq!(flatten_error_body(&body), None);

        let err = ApiError::from_response(400, &body);
        assert_eq!(err.message, "Dữ liệu không hợp lệ.");
        assert!(!err.message.contains('{'));
    }

    #[test]
    fn nested_field_errors_inside_arrays_are_flattened() {
        let body = json!([{"contact_phone": ["Số điện thoại không hợp lệ"], "code": 7}]);
        assert_eq!(
            flatten_error_body(&body).as_deref(),
            Some("Số điện thoại không hợp lệ")
        );
    }

    #[test]
    fn html_error_pages_are_not_shown() {
        let page = json!("<!DOCTYPE html><html><body>Server Error (500)</body></html>");
        let err = ApiError::from_response(500, &page);
        assert_eq!(err.message, "Đã xảy ra lỗi máy chủ. Vui lòng thử lại sau.");

        assert_eq!(readable_text("  upstream down \n").as_deref(), Some("upstream down"));
        assert_eq!(readable_text("line one\nline two"), None);
        assert_eq!(readable_text(&"x".repeat(201)), None);
    }

    #[test]
    fn empty_body_uses_status_fallback() {
        let err = ApiError::from_response(404, &Value::Null);
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Không tìm thấy dữ liệu yêu cầu.");

        let err = ApiError::from_response(500, &json!({}));
        assert_eq!(err.code, ErrorCode::Internal);
    }
}
