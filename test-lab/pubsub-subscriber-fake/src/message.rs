//! Extraction of the payload carried by a delivered message.

use axum::body::{Body, to_bytes};
use thiserror::Error;
use tracing::{debug, trace};

/// Largest request body read, same as axum's default body limit.
pub const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Reasons why a delivered message cannot be consumed.
///
/// Every one of them ends up as a `DROP` status sent back to the sidecar.
#[derive(Debug, Error)]
pub enum MessageExtractionError {
    /// The request body could not be read.
    #[error("could not read request body: {0}")]
    BodyRead(#[from] axum::Error),

    /// The body is not valid JSON.
    #[error("could not parse request body as JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The body is valid JSON but not an object.
    #[error("request body is not a JSON object")]
    NotAnObject,

    /// The envelope has no `data` field.
    #[error("request body has no 'data' field")]
    MissingData,

    /// The `data` field holds something else than a string.
    #[error("'data' field is not a string: {0}")]
    DataNotAString(serde_json::Value),
}

/// Read the whole request body and extract the message payload from it.
///
/// Bodies larger than [MAX_BODY_SIZE] fail to be read.
pub async fn read_message(body: Body) -> Result<String, MessageExtractionError> {
    let bytes = to_bytes(body, MAX_BODY_SIZE).await?;

    extract_message(&bytes)
}

/// Extract the `data` string out of a delivery envelope, other fields are ignored.
pub fn extract_message(body: &[u8]) -> Result<String, MessageExtractionError> {
    trace!("body={}", String::from_utf8_lossy(body));

    let envelope: serde_json::Value = serde_json::from_slice(body)?;
    let mut envelope = match envelope {
        serde_json::Value::Object(map) => map,
        _ => return Err(MessageExtractionError::NotAnObject),
    };

    match envelope.remove("data") {
        Some(serde_json::Value::String(message)) => {
            debug!("extracted message='{message}'");
            Ok(message)
        }
        Some(other) => Err(MessageExtractionError::DataNotAString(other)),
        None => Err(MessageExtractionError::MissingData),
    }
}
