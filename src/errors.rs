use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTML parse error: {0}")]
    HtmlParse(String),

    #[error("Unsupported selector: {0}")]
    UnsupportedSelector(String),

    #[error("DOM error: {0}")]
    Dom(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Fill error: {0}")]
    Fill(String),

    #[error("Remote collaborator error: {0}")]
    Remote(String),

    #[error("Rejected remote plan: {0}")]
    InvalidPlan(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Page navigated during operation")]
    Navigated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl serde::Serialize for FormPilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type FormPilotResult<T> = Result<T, FormPilotError>;
