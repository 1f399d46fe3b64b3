//! Line-framing contract between a [`Connection`](crate::connection::Connection)
//! and the byte stream under it.
//!
//! A transport moves chat lines, not bytes. Readers hand back one decoded
//! line per [`Frame::Line`], never longer than their frame limit, and signal
//! a clean end of stream with [`Frame::End`]. Writers put exactly one line on
//! the wire per call. The TCP implementation lives in
//! [`crate::tcp_transport`]; tests plug in in-memory doubles.

use std::future::Future;

use thiserror::Error;

use crate::protocol::MAX_FRAME_LEN;

/// Errors that can occur while moving frames.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote peer went away while we were writing.
    #[error("connection closed")]
    ConnectionClosed,

    /// A read did not complete within the configured read timeout.
    #[error("timed out waiting for data")]
    TimedOut,

    /// The peer sent more than `limit` bytes without a line terminator.
    #[error("frame exceeds {limit} bytes")]
    FrameTooLong { limit: usize },

    #[error("{0}")]
    Io(String),
}

/// One unit read off a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A chat line with its terminator stripped, decoded as text.
    Line(String),
    /// The peer closed its side of the stream.
    End,
}

/// Read half: turns the inbound stream into [`Frame`]s.
pub trait FrameReader: Send + 'static {
    /// Longest line, terminator included, this reader will buffer before
    /// failing with [`TransportError::FrameTooLong`].
    fn frame_limit(&self) -> usize {
        MAX_FRAME_LEN
    }

    fn read_frame(&mut self) -> impl Future<Output = Result<Frame, TransportError>> + Send;
}

/// Write half: puts one chat line on the wire per call and flushes it.
pub trait FrameWriter: Send + 'static {
    fn write_frame(&mut self, line: &str) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A duplex line transport. The receive loop owns the reader and the writer
/// task owns the writer.
pub trait Transport: Send + 'static {
    type Reader: FrameReader;
    type Writer: FrameWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}
