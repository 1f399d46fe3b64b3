//! Line-framed TCP transport.
//!
//! Provides a [`Transport`] over a plain `tokio` [`TcpStream`]. One frame is
//! one line; see [`crate::protocol`] for the framing rules.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::config::Endpoint;
use crate::protocol::{MAX_FRAME_LEN, decode_frame, encode_frame};
use crate::transport::{Frame, FrameReader, FrameWriter, Transport, TransportError};

/// TCP transport carrying newline-delimited text.
pub struct TcpTransport {
    stream: TcpStream,
    frame_limit: usize,
}

impl TcpTransport {
    /// Resolve `endpoint` and connect to it.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        // Chat lines are small and latency matters more than throughput.
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            frame_limit: MAX_FRAME_LEN,
        }
    }

    /// Override the inbound frame limit.
    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = limit;
        self
    }
}

impl Transport for TcpTransport {
    type Reader = TcpReader;
    type Writer = TcpWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (read_half, write_half) = self.stream.into_split();
        (
            TcpReader {
                reader: BufReader::new(read_half),
                buf: Vec::new(),
                limit: self.frame_limit,
            },
            TcpWriter { writer: write_half },
        )
    }
}

/// Read half of a TCP transport.
pub struct TcpReader {
    reader: BufReader<OwnedReadHalf>,
    buf: Vec<u8>,
    limit: usize,
}

impl FrameReader for TcpReader {
    fn frame_limit(&self) -> usize {
        self.limit
    }

    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        self.buf.clear();
        loop {
            let available = self
                .reader
                .fill_buf()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            if available.is_empty() {
                // An unterminated tail before EOF still counts as a line.
                if self.buf.is_empty() {
                    return Ok(Frame::End);
                }
                break;
            }

            let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (&available[..=end], true),
                None => (available, false),
            };
            if self.buf.len() + chunk.len() > self.limit {
                return Err(TransportError::FrameTooLong { limit: self.limit });
            }
            self.buf.extend_from_slice(chunk);
            let used = chunk.len();
            self.reader.consume(used);
            if complete {
                break;
            }
        }
        Ok(Frame::Line(decode_frame(&self.buf).into_owned()))
    }
}

/// Write half of a TCP transport.
pub struct TcpWriter {
    writer: OwnedWriteHalf,
}

impl FrameWriter for TcpWriter {
    async fn write_frame(&mut self, line: &str) -> Result<(), TransportError> {
        let frame = encode_frame(line);
        self.writer
            .write_all(frame.as_bytes())
            .await
            .map_err(write_error)?;
        self.writer.flush().await.map_err(write_error)
    }
}

fn write_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
            TransportError::ConnectionClosed
        }
        _ => TransportError::Io(e.to_string()),
    }
}
