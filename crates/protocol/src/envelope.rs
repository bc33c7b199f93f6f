use serde::{Deserialize, Serialize};

use crate::constants::{AUTH_MESSAGE_MARKERS, CODE_OK, CODE_UNAUTHORIZED};

/// Envelope wrapping every JSON response of the catalog backend.
///
/// `code == 200` means success; any other code is an application error
/// described by `message`. The HTTP status is usually 200 either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Creates a success envelope.
    pub fn ok(data: T) -> Self {
        Self {
            code: CODE_OK,
            data: Some(data),
            message: None,
        }
    }

    /// Creates an error envelope.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Returns `true` if the envelope reports success.
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// Returns `true` if the envelope reports a missing or expired login.
    pub fn is_auth_error(&self) -> bool {
        if self.code == CODE_UNAUTHORIZED {
            return true;
        }
        !self.is_ok() && self.message.as_deref().is_some_and(is_auth_message)
    }

    /// Returns the error message, or an empty string.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Returns `true` if an error message refers to authentication.
pub fn is_auth_message(message: &str) -> bool {
    AUTH_MESSAGE_MARKERS.iter().any(|m| message.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::InitUploadResponse;

    #[test]
    fn parse_success_envelope() {
        let json = r#"{"code":200,"message":"初始化成功","data":{"uploadId":"u-1"}}"#;
        let resp: ApiResponse<InitUploadResponse> = serde_json::from_str(json).unwrap();
        assert!(resp.is_ok());
        assert!(!resp.is_auth_error());
        assert_eq!(resp.data.unwrap().upload_id, "u-1");
    }

    #[test]
    fn parse_envelope_without_data() {
        let json = r#"{"code":500,"message":"分片上传失败"}"#;
        let resp: ApiResponse<InitUploadResponse> = serde_json::from_str(json).unwrap();
        assert!(!resp.is_ok());
        assert!(resp.data.is_none());
        assert_eq!(resp.message(), "分片上传失败");
    }

    #[test]
    fn code_401_is_auth_error() {
        let resp: ApiResponse<()> = ApiResponse::error(401, "用户未登录或Token无效");
        assert!(resp.is_auth_error());
    }

    #[test]
    fn auth_message_with_generic_code_is_auth_error() {
        let resp: ApiResponse<()> = ApiResponse::error(500, "token expired");
        assert!(resp.is_auth_error());
    }

    #[test]
    fn auth_marker_ignored_on_success() {
        let mut resp = ApiResponse::ok(());
        resp.message = Some("token refreshed".into());
        assert!(!resp.is_auth_error());
    }

    #[test]
    fn server_error_is_not_auth_error() {
        let resp: ApiResponse<()> = ApiResponse::error(500, "disk full");
        assert!(!resp.is_auth_error());
    }
}
