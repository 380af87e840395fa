//! # Helper Line Protocol
//!
//! Frames are single JSON objects terminated by `\n`, UTF-8 encoded.
//!
//! ```text
//! request:  {"key_data": "<token-or-empty>"}     once, at open
//! request:  {"sign_data": "<base64(message)>"}   once per sign
//! response: {"key_data"?: "...", "public_key"?: "...", "signature"?: "..."}
//! ```
//!
//! Unknown response fields are ignored.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::entities::{HelperRequest, HelperResponse};
use crate::domain::errors::ProtocolError;

/// Serialize `message` as one newline-terminated frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut frame =
        serde_json::to_vec(message).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    frame.push(b'\n');
    Ok(frame)
}

/// Parse one response line (with or without its terminator).
pub fn decode_response(line: &str) -> Result<HelperResponse, ProtocolError> {
    decode_object(line)
}

/// Parse one request line (with or without its terminator).
pub fn decode_request(line: &str) -> Result<HelperRequest, ProtocolError> {
    decode_object(line)
}

fn decode_object<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }

    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
