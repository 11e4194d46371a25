use thiserror::Error;

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("Feed parsing error: {0}")]
    Format(#[from] FormatError),

    #[error("Storage is suspended")]
    Suspended,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// A specific reason a format parser rejected its input.
///
/// Callers use the reason to decide whether another parser might
/// accept the same bytes or whether the document is not a feed at all.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Data is not a feed")]
    NotAFeed,

    #[error("Invalid JSON")]
    InvalidJson,

    #[error("JSON Feed version not found")]
    JsonFeedVersionNotFound,

    #[error("JSON Feed items not found")]
    JsonFeedItemsNotFound,

    #[error("JSON Feed title not found")]
    JsonFeedTitleNotFound,

    #[error("RSS channel not found")]
    RssChannelNotFound,

    #[error("RSS items not found")]
    RssItemsNotFound,

    #[error("Root element not found")]
    RootElementNotFound,

    #[error("XML parsing error: {0}")]
    Xml(String),
}

impl From<crate::config::ConfigError> for TributaryError {
    fn from(error: crate::config::ConfigError) -> Self {
        TributaryError::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TributaryError>;
