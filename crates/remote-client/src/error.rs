//! Errors raised while talking to the remote server.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    // === Credentials ===
    #[error("Unauthorized Access. Check your token.")]
    Unauthorized,

    #[error("Missing remote token. Set it in {config_path} or env AI_MODELS_REMOTE_TOKEN")]
    MissingToken { config_path: String },

    #[error("Refusing to send credentials to non-HTTPS URL {0}")]
    InsecureUrl(String),

    #[error("Invalid remote configuration: {0}")]
    Config(String),

    // === Server answers ===
    #[error("{action} rejected: {status}{}", reason_suffix(.reason))]
    Rejected {
        action: &'static str,
        status: String,
        reason: Option<String>,
    },

    #[error("Request failed{}", reason_suffix(.reason))]
    JobFailed { reason: Option<String> },

    // === Transport ===
    #[error("{action} {url}: {message}")]
    Transport {
        action: &'static str,
        url: String,
        message: String,
    },

    #[error("{action} {url}: giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        action: &'static str,
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(" ({})", reason),
        None => String::new(),
    }
}

impl RemoteError {
    pub fn transport(action: &'static str, url: impl ToString, message: impl ToString) -> Self {
        RemoteError::Transport {
            action,
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_reason() {
        let err = RemoteError::Rejected {
            action: "upload",
            status: "error".into(),
            reason: Some("file too large".into()),
        };
        assert_eq!(err.to_string(), "upload rejected: error (file too large)");

        let err = RemoteError::JobFailed { reason: None };
        assert_eq!(err.to_string(), "Request failed");
    }
}
