use shared::error::ApiError;

use crate::transport::RequestError;

/// Reduces any request failure to one readable sentence. Raw backend bodies
/// are flattened; they never reach a caller verbatim.
pub fn user_message(err: &RequestError) -> String {
    match err {
        RequestError::Status { status, data, .. } => {
            ApiError::from_response(*status, data).message
        }
        RequestError::Transport(err) if err.is_timeout() => {
            "Máy chủ phản hồi quá lâu. Vui lòng thử lại.".to_string()
        }
        RequestError::Transport(_) => "Không thể kết nối tới máy chủ.".to_string(),
        RequestError::Decode { .. } | RequestError::Unexpected { .. } => {
            "Phản hồi từ máy chủ không hợp lệ.".to_string()
        }
        RequestError::InvalidUrl(_) => "Địa chỉ máy chủ không hợp lệ.".to_string(),
    }
}

/// `"{context}: {reason}"`, the shape every surfaced failure takes.
pub fn describe(context: &str, err: &RequestError) -> String {
    format!("{context}: {}", user_message(err))
}
