use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Camera could not be opened; the device stays released.
    #[error("failed to open camera {index}: {reason}")]
    DeviceOpen { index: u32, reason: String },

    /// No readable frame after the bounded retries; the device stays open.
    #[error("capture failed: {0}")]
    Capture(String),

    #[error("detector unavailable: {0}")]
    Detection(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("dialogue generation failed: {0}")]
    Dialogue(String),

    #[error("speech synthesis failed: {0}")]
    Speech(String),

    #[error("failed to persist {what}: {source}")]
    Persistence {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl From<candle_core::Error> for Error {
    fn from(e: candle_core::Error) -> Self {
        Error::Model(e.to_string())
    }
}

impl Error {
    pub fn persistence(what: impl Into<String>, source: std::io::Error) -> Self {
        Error::Persistence {
            what: what.into(),
            source,
        }
    }
}
