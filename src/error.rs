use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Buildkite API unavailable{}: {message}", status_suffix(.status))]
    RemoteUnavailable {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl InsightsError {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            status,
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RemoteUnavailable { status: Some(429), .. })
    }
}

impl From<reqwest::Error> for InsightsError {
    fn from(e: reqwest::Error) -> Self {
        Self::remote(e.status().map(|s| s.as_u16()), e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InsightsError>;
