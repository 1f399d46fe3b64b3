//! Client orchestrator — connects the chat session and the TUI frontend.
//!
//! This module owns the event loop and drives:
//! - [`chat_core::session::SessionController`] — connection events and input policy
//! - [`crate::tui::Tui`] — ratatui TUI frontend
//!
//! The task running the loop is the display-owning thread: connection events
//! only touch the chat state from here.

use std::io;
use std::time::Duration;

use chat_core::chat_state::{ChatState, PollResult};
use chat_core::config::SessionConfig;
use chat_core::session::SessionController;
use tokio::time::MissedTickBehavior;

use crate::tui::{Tui, UserIntent};

/// How long the final notice stays on screen before the UI closes.
const FAREWELL_DELAY: Duration = Duration::from_secs(2);

/// Longest the loop waits for a connection event before checking the
/// keyboard again.
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What the event loop needs from a display.
pub trait Frontend {
    fn render(&mut self, chat: &ChatState) -> io::Result<()>;

    /// Apply any pending key presses to `chat` without blocking.
    fn poll_intent(&mut self, chat: &mut ChatState) -> io::Result<UserIntent>;
}

impl Frontend for Tui {
    fn render(&mut self, chat: &ChatState) -> io::Result<()> {
        Tui::render(self, chat)
    }

    fn poll_intent(&mut self, chat: &mut ChatState) -> io::Result<UserIntent> {
        self.poll_and_handle_input(chat)
    }
}

/// Start a chat session and run the TUI until the user quits or the
/// connection ends.
pub async fn start_client(config: SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut ctrl = SessionController::start(config);

    let mut tui = Tui::setup()?;
    let result = run_event_loop(&mut tui, &mut ctrl).await;
    tui.teardown()?;
    result?;

    // Repeat the reason on the restored terminal so it survives the UI.
    if let Some(notice) = ctrl.state.latest_notice()
        && notice.is_terminal()
    {
        eprintln!("{}", notice);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn run_event_loop<F: Frontend>(
    frontend: &mut F,
    ctrl: &mut SessionController,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut input_tick = tokio::time::interval(INPUT_POLL_INTERVAL);
    input_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        frontend.render(&ctrl.state)?;

        tokio::select! {
            poll = ctrl.recv() => {
                if let PollResult::Ended(reason) = poll {
                    tracing::info!(?reason, "Session ended");
                    frontend.render(&ctrl.state)?;
                    tokio::time::sleep(FAREWELL_DELAY).await;
                    break;
                }
            }

            _ = input_tick.tick() => {}
        }

        // Checked on every pass, so a busy server cannot lock out the keyboard.
        match frontend.poll_intent(&mut ctrl.state)? {
            UserIntent::Quit => {
                ctrl.quit();
                break;
            }
            UserIntent::Submit => {
                // Failures are already recorded as notices.
                let _ = ctrl.submit_input();
            }
            UserIntent::Reset => ctrl.reset_scrollback(),
            UserIntent::None => {}
        }
    }

    Ok(())
}
