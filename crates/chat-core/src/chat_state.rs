use std::collections::VecDeque;
use std::fmt;

use crate::connection::ConnectionEvent;
use crate::protocol::{ValidationError, is_sentinel};

/// Scrollback lines kept before the oldest are dropped.
pub const SCROLLBACK_LIMIT: usize = 500;

/// Notices kept before the oldest are dropped.
pub const NOTICE_LIMIT: usize = 20;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the stream.
    PeerClosed,
    /// A connect, read, or write error; the text is the error's display form.
    Failed(String),
    /// The user quit.
    Quit,
}

/// Where the session is, as far as the display is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    Ended(SessionEnd),
}

/// A human-readable indicator for the display surface. Frontends decide how
/// to present each kind (toast, status line, coloured log entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Local input was rejected; the session continues.
    Rejected(ValidationError),
    /// A send could not be queued.
    SendFailed(String),
    /// The server closed the connection.
    ConnectionLost,
    /// A network error ended the session.
    Error(String),
}

impl Notice {
    /// Returns `true` for notices that accompany the end of the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConnectionLost | Self::Error(_))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "{reason}"),
            Self::SendFailed(reason) => write!(f, "message not sent: {reason}"),
            Self::ConnectionLost => f.write_str("connection to the server was lost"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Outcome of applying one connection event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// The connection opened.
    Connected,
    /// A line was appended to the scrollback.
    Appended,
    /// The event carried nothing to display.
    Ignored,
    /// The session is over; the display should show the latest notice and
    /// close.
    Ended(SessionEnd),
    /// No event was available.
    Empty,
}

/// Everything the chat screen renders.
#[derive(Debug, Clone)]
pub struct ChatState {
    /// Received lines, oldest first.
    pub scrollback: VecDeque<String>,
    /// The line the user is editing.
    pub input: String,
    pub notices: VecDeque<Notice>,
    pub status: SessionStatus,
    pub nickname: String,
}

impl ChatState {
    pub fn new(nickname: &str) -> Self {
        Self {
            scrollback: VecDeque::new(),
            input: String::new(),
            notices: VecDeque::new(),
            status: SessionStatus::Connecting,
            nickname: nickname.to_string(),
        }
    }

    /// Apply a connection event. Must run on the thread that owns the
    /// display.
    pub fn apply_event(&mut self, event: ConnectionEvent) -> PollResult {
        if self.is_ended() {
            return PollResult::Ignored;
        }
        match event {
            ConnectionEvent::Connected => {
                self.status = SessionStatus::Connected;
                PollResult::Connected
            }
            ConnectionEvent::Message(text) => {
                if is_sentinel(&text) {
                    return PollResult::Ignored;
                }
                self.append_line(text);
                PollResult::Appended
            }
            ConnectionEvent::Disconnected => {
                self.push_notice(Notice::ConnectionLost);
                self.end(SessionEnd::PeerClosed)
            }
            ConnectionEvent::Error(err) => {
                let reason = err.to_string();
                self.push_notice(Notice::Error(reason.clone()));
                self.end(SessionEnd::Failed(reason))
            }
        }
    }

    /// Append one received line, keeping only the last
    /// [`SCROLLBACK_LIMIT`] entries.
    pub fn append_line(&mut self, text: String) {
        self.scrollback.push_back(text);
        if self.scrollback.len() > SCROLLBACK_LIMIT {
            self.scrollback.pop_front();
        }
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push_back(notice);
        if self.notices.len() > NOTICE_LIMIT {
            self.notices.pop_front();
        }
    }

    /// The scrollback as displayed text: every line followed by one line
    /// break.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for line in &self.scrollback {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn clear_scrollback(&mut self) {
        self.scrollback.clear();
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.status, SessionStatus::Ended(_))
    }

    pub(crate) fn end(&mut self, reason: SessionEnd) -> PollResult {
        self.status = SessionStatus::Ended(reason.clone());
        PollResult::Ended(reason)
    }
}
