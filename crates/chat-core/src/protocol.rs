//! Line protocol: framing, the inbound sentinel, and outbound composition.
//!
//! Every chat message is one UTF-8 line. We terminate writes with `\r\n`
//! and accept either `\n` or `\r\n` on read.

use std::borrow::Cow;

use thiserror::Error;

/// Terminator appended to every outbound frame.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Inbound text that carries no chat content and must never be displayed.
///
/// Peers built on a line reader that yields a null reference at end of
/// stream forward it as this literal string.
pub const NULL_SENTINEL: &str = "null";

/// Separator between the nickname and the message body.
pub const NICK_DELIMITER: &str = ": ";

/// Largest inbound frame a reader accepts, terminator included.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Local input rejected before it reaches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message must not be empty")]
    Empty,

    #[error("message must not be whitespace-only")]
    WhitespaceOnly,
}

/// Check raw user input and return the trimmed body.
pub fn validate_message(raw: &str) -> Result<&str, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::Empty);
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::WhitespaceOnly);
    }
    Ok(trimmed)
}

/// Build the outbound chat line `nickname: body` from raw user input.
pub fn compose_outbound(nickname: &str, raw: &str) -> Result<String, ValidationError> {
    let body = validate_message(raw)?;
    Ok(format!("{nickname}{NICK_DELIMITER}{body}"))
}

/// Returns `true` for inbound text that should be dropped silently.
pub fn is_sentinel(text: &str) -> bool {
    text == NULL_SENTINEL
}

/// Encode `text` as exactly one wire frame.
///
/// Embedded line breaks would split the message into several frames on the
/// peer's side, so they are replaced with spaces.
pub fn encode_frame(text: &str) -> String {
    let mut frame: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    frame.push_str(LINE_TERMINATOR);
    frame
}

/// Turn a raw line read off the wire into text.
///
/// Strips the line terminator. Bytes that are not valid UTF-8 are replaced
/// with U+FFFD instead of failing the whole line.
pub fn decode_frame(raw: &[u8]) -> Cow<'_, str> {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line)
}
