use thiserror::Error;

/// Reasons a payload could not be turned into a typed event.
///
/// None of these are fatal: the raw message is still recorded upstream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8")]
    NotUtf8,

    #[error("Payload is empty")]
    Empty,

    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    #[error("Expected a JSON object")]
    NotAnObject,

    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Field '{0}' is not a number")]
    NotANumber(String),

    #[error("Unknown switch command '{0}'")]
    UnknownCommand(String),

    #[error("Topic '{0}' carries no valid socket id")]
    InvalidSocketId(String),
}
