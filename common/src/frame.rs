use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;

/// A single encoded still image as delivered by the rendering client.
///
/// Wire format is a data URI as produced by `canvas.toDataURL()`:
///
///   data:<mime>;base64,<payload>
///
/// A bare base64 string (no `data:` prefix) is accepted as well.
#[derive(Debug, Clone)]
pub struct FramePayload {
    encoded: String,
}

/// Raw image bytes recovered from a [`FramePayload`].
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl FramePayload {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }

    /// Returns the payload length in encoded characters.
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    /// Decode the payload into raw image bytes.
    ///
    /// The bytes must carry a recognizable image signature; anything else is
    /// a malformed frame and is never written to disk.
    pub fn decode(&self) -> Result<DecodedFrame, FrameError> {
        let data = strip_data_uri(self.encoded.trim())?;
        if data.is_empty() {
            return Err(FrameError::Empty);
        }

        let bytes = STANDARD
            .decode(data)
            .map_err(|e| FrameError::Base64(e.to_string()))?;
        if bytes.is_empty() {
            return Err(FrameError::Empty);
        }

        let format = image::guess_format(&bytes).map_err(|_| FrameError::NotAnImage {
            len: bytes.len(),
        })?;

        Ok(DecodedFrame { bytes, format })
    }
}

impl DecodedFrame {
    /// Whether these bytes belong in a file named `*.{extension}`.
    /// Extensions that name no known image format accept any frame.
    pub fn matches_extension(&self, extension: &str) -> bool {
        match ImageFormat::from_extension(extension) {
            Some(expected) => expected == self.format,
            None => true,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Split off the `data:<mime>;base64,` header, returning the base64 body.
fn strip_data_uri(encoded: &str) -> Result<&str, FrameError> {
    let Some(rest) = encoded.strip_prefix("data:") else {
        return Ok(encoded);
    };
    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| FrameError::MalformedUri("missing ',' separator".into()))?;
    if !header.ends_with(";base64") {
        return Err(FrameError::MalformedUri(format!(
            "expected base64 encoding, got header {header:?}"
        )));
    }
    Ok(body)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame payload is empty")]
    Empty,
    #[error("malformed data URI: {0}")]
    MalformedUri(String),
    #[error("invalid base64 in frame payload: {0}")]
    Base64(String),
    #[error("frame payload is not a recognized image ({len} bytes)")]
    NotAnImage { len: usize },
}
