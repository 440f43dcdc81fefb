//! Unified Error Model
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KdxError {
    #[error("TRANSPORT/{0}")]
    Transport(String),

    #[error("HTTP/{status}: {message}")]
    Http { status: u16, message: String },

    #[error("RPC/{0}")]
    Rpc(RpcError),

    #[error("TRANSFORM/{0}")]
    Transform(String),

    #[error("CHAIN/{0}")]
    Chain(String),

    #[error("CONFIG/{0}")]
    Config(String),
}

impl KdxError {
    /// The remote error, if the server answered this call with one
    pub fn as_rpc(&self) -> Option<&RpcError> {
        match self {
            KdxError::Rpc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RpcError> for KdxError {
    fn from(err: RpcError) -> Self {
        KdxError::Rpc(err)
    }
}

/// Error codes shared by client and server, with their JSON-RPC number
/// and HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    BadRequest,
    InternalServerError,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    Timeout,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    UnprocessableContent,
    TooManyRequests,
    ClientClosedRequest,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 14] = [
        ErrorCode::ParseError,
        ErrorCode::BadRequest,
        ErrorCode::InternalServerError,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::MethodNotSupported,
        ErrorCode::Timeout,
        ErrorCode::Conflict,
        ErrorCode::PreconditionFailed,
        ErrorCode::PayloadTooLarge,
        ErrorCode::UnprocessableContent,
        ErrorCode::TooManyRequests,
        ErrorCode::ClientClosedRequest,
    ];

    pub fn json_rpc_code(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::BadRequest => -32600,
            ErrorCode::InternalServerError => -32603,
            ErrorCode::Unauthorized => -32001,
            ErrorCode::Forbidden => -32003,
            ErrorCode::NotFound => -32004,
            ErrorCode::MethodNotSupported => -32005,
            ErrorCode::Timeout => -32008,
            ErrorCode::Conflict => -32009,
            ErrorCode::PreconditionFailed => -32012,
            ErrorCode::PayloadTooLarge => -32013,
            ErrorCode::UnprocessableContent => -32022,
            ErrorCode::TooManyRequests => -32029,
            ErrorCode::ClientClosedRequest => -32099,
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::ParseError | ErrorCode::BadRequest => 400,
            ErrorCode::InternalServerError => 500,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotSupported => 405,
            ErrorCode::Timeout => 408,
            ErrorCode::Conflict => 409,
            ErrorCode::PreconditionFailed => 412,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::UnprocessableContent => 422,
            ErrorCode::TooManyRequests => 429,
            ErrorCode::ClientClosedRequest => 499,
        }
    }

    pub fn from_json_rpc_code(code: i64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| i64::from(c.json_rpc_code()) == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by a procedure and carried over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    pub path: Option<String>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Wire shape: `{message, code, data: {code, httpStatus, path}}`
    pub fn to_shape(&self) -> ErrorShape {
        ErrorShape {
            message: self.message.clone(),
            code: self.code.json_rpc_code(),
            data: ErrorData {
                code: self.code,
                http_status: self.code.http_status(),
                path: self.path.clone(),
            },
        }
    }

    pub fn from_shape(shape: ErrorShape) -> Self {
        let code = ErrorCode::from_json_rpc_code(i64::from(shape.code)).unwrap_or(shape.data.code);
        Self {
            code,
            message: shape.message,
            path: shape.data.path,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} at {}: {}", self.code, path, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub message: String,
    pub code: i32,
    pub data: ErrorData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub code: ErrorCode,
    pub http_status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_wire_numbers() {
        assert_eq!(ErrorCode::ParseError.json_rpc_code(), -32700);
        assert_eq!(ErrorCode::BadRequest.http_status(), 400);
        assert_eq!(ErrorCode::NotFound.json_rpc_code(), -32004);
        assert_eq!(ErrorCode::ClientClosedRequest.http_status(), 499);
    }

    #[test]
    fn test_code_lookup_by_number() {
        for code in ErrorCode::ALL {
            let found = ErrorCode::from_json_rpc_code(i64::from(code.json_rpc_code()));
            assert_eq!(found, Some(code));
        }
        assert_eq!(ErrorCode::from_json_rpc_code(1), None);
    }

    #[test]
    fn test_error_shape_serialization() {
        let err = RpcError::bad_request("text must not be empty").with_path("greeting.hello");
        let json = serde_json::to_value(err.to_shape()).unwrap();

        assert_eq!(json["message"], "text must not be empty");
        assert_eq!(json["code"], -32600);
        assert_eq!(json["data"]["code"], "BAD_REQUEST");
        assert_eq!(json["data"]["httpStatus"], 400);
        assert_eq!(json["data"]["path"], "greeting.hello");

        let parsed: ErrorShape = serde_json::from_value(json).unwrap();
        assert_eq!(RpcError::from_shape(parsed), err);
    }

    #[test]
    fn test_display_prefixes() {
        let err = KdxError::Http { status: 502, message: "bad gateway".to_string() };
        assert_eq!(err.to_string(), "HTTP/502: bad gateway");

        let err = KdxError::from(RpcError::not_found("no such procedure"));
        assert_eq!(err.to_string(), "RPC/NOT_FOUND: no such procedure");
        assert!(err.as_rpc().is_some());
    }
}
