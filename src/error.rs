/// Error types for the launcher
use thiserror::Error;

/// Failures crossing the JS boundary or the persistence layer.
///
/// JS errors arrive as opaque `JsValue`s; they are rendered with `{:?}` at the
/// call site and carried here as text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LauncherError {
    #[error("storage read failed: {0}")]
    StorageRead(String),

    #[error("storage write failed: {0}")]
    StorageWrite(String),

    #[error("failed to decode {what}: {detail}")]
    Decode { what: &'static str, detail: String },

    #[error("failed to encode {what}: {detail}")]
    Encode { what: &'static str, detail: String },

    #[error("tab operation failed: {0}")]
    Tabs(String),

    #[error("frame bypass rule update failed: {0}")]
    Bypass(String),

    #[error("runtime message failed: {0}")]
    Runtime(String),

    #[error("image store failed: {0}")]
    Images(String),

    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("site `{0}` not found")]
    SiteNotFound(String),

    #[error("browser window unavailable")]
    NoWindow,
}

impl LauncherError {
    pub fn decode(what: &'static str, detail: impl std::fmt::Display) -> Self {
        LauncherError::Decode {
            what,
            detail: detail.to_string(),
        }
    }

    pub fn encode(what: &'static str, detail: impl std::fmt::Display) -> Self {
        LauncherError::Encode {
            what,
            detail: detail.to_string(),
        }
    }
}

pub type LauncherResult<T> = Result<T, LauncherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LauncherError::decode("settings", "missing field `sites`");
        assert_eq!(err.to_string(), "failed to decode settings: missing field `sites`");

        let err = LauncherError::SiteNotFound("abc".to_string());
        assert_eq!(err.to_string(), "site `abc` not found");
    }
}
