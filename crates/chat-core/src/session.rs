//! Framework-agnostic session controller.
//!
//! Owns a [`Connection`] and a [`ChatState`], providing the shared chat
//! logic:
//!
//! - Validating and formatting user input before it reaches the network.
//! - Applying connection events to the chat state on the display thread.
//!
//! Frontends only need to:
//! 1. Call [`SessionController::start`] to begin connecting.
//! 2. Call [`SessionController::try_recv`] or [`SessionController::recv`]
//!    from the thread that owns the display.
//! 3. Call [`SessionController::submit_input`] when the user presses send.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::chat_state::{ChatState, Notice, PollResult, SessionEnd, SessionStatus};
use crate::config::SessionConfig;
use crate::connection::{
    Connection, ConnectionError, ConnectionEvent, ConnectionState, DispatchingListener,
};
use crate::protocol::{ValidationError, compose_outbound};

/// Why a submission did not go out.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] ValidationError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Owns the connection and chat state, providing event dispatch logic.
pub struct SessionController {
    config: SessionConfig,
    connection: Connection,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    pub state: ChatState,
}

impl SessionController {
    /// Start a session: begin connecting to `config.endpoint` in the
    /// background. Must be called from within a tokio runtime.
    ///
    /// Connection events are queued for whichever task drains this
    /// controller, which makes that task the display-owning thread.
    pub fn start(config: SessionConfig) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let connection = Connection::open(
            config.endpoint.clone(),
            config.options,
            Arc::new(DispatchingListener::new(tx)),
        );
        tracing::info!(
            endpoint = %config.endpoint,
            nickname = %config.nickname,
            "Session started"
        );
        let state = ChatState::new(&config.nickname);
        Self {
            config,
            connection,
            events,
            state,
        }
    }

    /// Try to receive and apply one connection event (non-blocking).
    ///
    /// Frontends should call this in a loop until [`PollResult::Empty`] is
    /// returned.
    pub fn try_recv(&mut self) -> PollResult {
        match self.events.try_recv() {
            Ok(event) => self.state.apply_event(event),
            Err(mpsc::error::TryRecvError::Empty) => PollResult::Empty,
            Err(mpsc::error::TryRecvError::Disconnected) => self.channel_closed(),
        }
    }

    /// Await the next connection event and apply it.
    ///
    /// This is useful in `tokio::select!` loops.
    pub async fn recv(&mut self) -> PollResult {
        match self.events.recv().await {
            Some(event) => self.state.apply_event(event),
            None => self.channel_closed(),
        }
    }

    /// Validate `raw_text`, prefix it with the nickname, and queue it.
    ///
    /// The input buffer is cleared whatever the outcome. Rejections and send
    /// failures are also pushed as notices.
    pub fn submit(&mut self, raw_text: &str) -> Result<(), SessionError> {
        self.state.input.clear();

        let line = match compose_outbound(&self.config.nickname, raw_text) {
            Ok(line) => line,
            Err(reason) => {
                tracing::debug!(%reason, "Message rejected");
                self.state.push_notice(Notice::Rejected(reason));
                return Err(reason.into());
            }
        };

        if let Err(err) = self.connection.send(line) {
            tracing::debug!(error = %err, "Message not sent");
            self.state.push_notice(Notice::SendFailed(err.to_string()));
            return Err(err.into());
        }
        Ok(())
    }

    /// [`submit`](Self::submit) whatever is in the input buffer.
    pub fn submit_input(&mut self) -> Result<(), SessionError> {
        let raw = std::mem::take(&mut self.state.input);
        self.submit(&raw)
    }

    /// Clear the scrollback.
    pub fn reset_scrollback(&mut self) {
        self.state.clear_scrollback();
    }

    /// End the session from our side. No disconnect notice is produced.
    pub fn quit(&mut self) {
        self.connection.close();
        if !self.state.is_ended() {
            self.state.end(SessionEnd::Quit);
        }
        tracing::info!(endpoint = %self.config.endpoint, "Session quit");
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    // -- private -----------------------------------------------------------

    fn channel_closed(&mut self) -> PollResult {
        // The listener lives as long as the connection, so this only happens
        // after teardown.
        if let SessionStatus::Ended(reason) = &self.state.status {
            return PollResult::Ended(reason.clone());
        }
        self.state.end(SessionEnd::Quit)
    }
}
