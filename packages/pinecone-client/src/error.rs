use thiserror::Error;

pub type Result<T> = std::result::Result<T, PineconeError>;

#[derive(Debug, Error)]
pub enum PineconeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pinecone API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("index has no data-plane host configured")]
    NoHost,
}
