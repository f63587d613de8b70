//! Optional gzip + base64 packing of notation, for passing HELM through URLs and other text-only channels

use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TransportError {
    #[error("nothing to decompress")]
    Empty,

    #[error("the payload is not valid base64")]
    #[diagnostic(help("transported notation uses the standard base64 alphabet, with padding"))]
    Base64(#[from] base64::DecodeError),

    #[error("the payload is not gzip-compressed")]
    NotGzip,

    #[error("failed to (de)compress the payload")]
    Io(#[from] std::io::Error),

    #[error("the decompressed payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Gzips `notation`, then encodes the result as base64
pub fn compress(notation: &str) -> Result<String, TransportError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(notation.len()), Compression::default());
    encoder.write_all(notation.as_bytes())?;
    let bytes = encoder.finish()?;
    Ok(STANDARD.encode(bytes))
}

/// Reverses [`compress`]
pub fn decompress(payload: &str) -> Result<String, TransportError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(TransportError::Empty);
    }

    let bytes = STANDARD.decode(payload)?;
    let mut decoder = GzDecoder::new(bytes.as_slice());
    if decoder.header().is_none() {
        return Err(TransportError::NotGzip);
    }
    // NOTE: Notation compresses well, so leave room for a few times the compressed size
    let mut decoded = Vec::with_capacity(bytes.len() * 4);
    decoder.read_to_end(&mut decoded)?;
    Ok(String::from_utf8(decoded)?)
}
