//! Newline-delimited codec for stream framing
//!
//! All stream messages are framed as:
//! ```text
//! [ N bytes: UTF-8 text ][ '\n' ]
//! ```
//!
//! A trailing `'\r'` is stripped. Datagrams carry exactly one message and
//! need no terminator.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::limits::MAX_LINE_LEN;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Line too long: {0} bytes (max: {MAX_LINE_LEN})")]
    LineTooLong(usize),

    #[error("Line contains an embedded newline")]
    EmbeddedNewline,

    #[error("Invalid UTF-8 in message")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Encode a single line, appending the terminator
pub fn encode_line(line: &str) -> Result<Bytes, CodecError> {
    if line.len() > MAX_LINE_LEN {
        return Err(CodecError::LineTooLong(line.len()));
    }
    if line.contains('\n') {
        return Err(CodecError::EmbeddedNewline);
    }

    let mut buf = BytesMut::with_capacity(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');

    Ok(buf.freeze())
}

/// Try to decode one line from a buffer
///
/// Returns:
/// - `Ok(Some(line))` if a complete line was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode(buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
    let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_LINE_LEN {
            return Err(CodecError::LineTooLong(buf.len()));
        }
        return Ok(None);
    };

    if pos > MAX_LINE_LEN {
        return Err(CodecError::LineTooLong(pos));
    }

    let frame = buf.split_to(pos + 1);
    let mut text = &frame[..pos];
    if let [rest @ .., b'\r'] = text {
        text = rest;
    }

    Ok(Some(std::str::from_utf8(text)?.to_string()))
}

/// Decode a datagram payload into a trimmed message
pub fn decode_datagram(payload: &[u8]) -> Result<String, CodecError> {
    if payload.len() > MAX_LINE_LEN {
        return Err(CodecError::LineTooLong(payload.len()));
    }
    Ok(std::str::from_utf8(payload)?.trim().to_string())
}

/// Decoder state machine for streaming decoding
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Partial line data being accumulated
    buffer: BytesMut,
}

impl LineDecoder {
    /// Create a new line decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next line from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete lines
    pub fn decode_next(&mut self) -> Result<Option<String>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Take whatever is left after the peer closed without a final newline
    pub fn finish(&mut self) -> Result<Option<String>, CodecError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let rest = self.buffer.split();
        let text = std::str::from_utf8(&rest)?.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_newline() {
        let encoded = encode_line("Hoşgeldiniz Doktor1").expect("encode failed");
        assert_eq!(&encoded[..], "Hoşgeldiniz Doktor1\n".as_bytes());
    }

    #[test]
    fn test_encode_rejects_embedded_newline() {
        assert_eq!(encode_line("a\nb"), Err(CodecError::EmbeddedNewline));
    }

    #[test]
    fn test_partial_decode() {
        let mut buf = BytesMut::from(&b"Hasta Ka"[..]);
        let result = decode(&mut buf).expect("decode should not fail on partial data");
        assert!(result.is_none(), "should return None for partial data");

        // Buffer should be unchanged (data not consumed)
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_line_decoder_chunks_and_crlf() {
        let mut decoder = LineDecoder::new();

        decoder.extend(b"Hasta ");
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(b"Kabul\r\nevet\n");
        assert_eq!(decoder.decode_next().unwrap().as_deref(), Some("Hasta Kabul"));
        assert_eq!(decoder.decode_next().unwrap().as_deref(), Some("evet"));
        assert!(decoder.decode_next().unwrap().is_none());
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_finish_returns_unterminated_tail() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"Doktor");
        assert!(decoder.decode_next().unwrap().is_none());
        assert_eq!(decoder.finish().unwrap().as_deref(), Some("Doktor"));
        assert!(decoder.finish().unwrap().is_none());
    }

    #[test]
    fn test_line_too_long() {
        let mut buf = BytesMut::new();
        buf.put_bytes(b'x', MAX_LINE_LEN + 1);

        let result = decode(&mut buf);
        assert!(matches!(result, Err(CodecError::LineTooLong(_))));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = BytesMut::from(&[0xff, 0xfe, b'\n'][..]);
        assert!(matches!(decode(&mut buf), Err(CodecError::InvalidUtf8(_))));
    }

    #[test]
    fn test_decode_datagram_trims() {
        assert_eq!(decode_datagram(b" evet \n").unwrap(), "evet");
        assert!(decode_datagram(&[0xc3]).is_err());
    }
}
