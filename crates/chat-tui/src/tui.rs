//! Ratatui TUI frontend for the chat client.
//!
//! Pure UI module: terminal lifecycle, rendering, and input → intent mapping.
//! Chat state lives in [`chat_core::chat_state`] and all networking in
//! [`chat_core::connection`]. This module has no networking dependencies.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use std::io::{self, Stdout};

use chat_core::chat_state::{ChatState, Notice, SessionStatus};

// ---------------------------------------------------------------------------
// UserIntent — result of processing user input
// ---------------------------------------------------------------------------

/// The result of processing a user input event.
#[derive(Debug, PartialEq, Eq)]
pub enum UserIntent {
    /// No action needed (e.g. the key only edited the input line).
    None,
    /// The user wants to leave the chat.
    Quit,
    /// The user pressed send; the input line holds the text.
    Submit,
    /// The user wants the scrollback cleared.
    Reset,
}

// ---------------------------------------------------------------------------
// TUI-only state
// ---------------------------------------------------------------------------

/// UI-layer state that lives alongside (but separate from) the chat state.
#[derive(Default)]
struct TuiState {
    /// Cursor position in the input line, in characters
    cursor: usize,
    /// Show help popup
    show_help: bool,
}

impl TuiState {
    fn clamp_cursor(&mut self, input: &str) {
        self.cursor = self.cursor.min(input.chars().count());
    }

    fn byte_index(&self, input: &str) -> usize {
        input
            .char_indices()
            .map(|(i, _)| i)
            .nth(self.cursor)
            .unwrap_or(input.len())
    }

    fn enter_char(&mut self, input: &mut String, c: char) {
        let index = self.byte_index(input);
        input.insert(index, c);
        self.cursor += 1;
    }

    fn delete_char(&mut self, input: &mut String) {
        if self.cursor == 0 {
            return;
        }
        let before = input.chars().take(self.cursor - 1);
        let after = input.chars().skip(self.cursor);
        *input = before.chain(after).collect();
        self.cursor -= 1;
    }

    fn handle_key(&mut self, key: KeyEvent, input: &mut String) -> UserIntent {
        self.clamp_cursor(input);
        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::F(1)) {
                self.show_help = false;
            }
            return UserIntent::None;
        }
        match key.code {
            KeyCode::Esc => UserIntent::Quit,
            KeyCode::F(1) => {
                self.show_help = true;
                UserIntent::None
            }
            KeyCode::Enter => {
                self.cursor = 0;
                UserIntent::Submit
            }
            KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                UserIntent::Reset
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                UserIntent::Quit
            }
            KeyCode::Char(c) => {
                self.enter_char(input, c);
                UserIntent::None
            }
            KeyCode::Backspace => {
                self.delete_char(input);
                UserIntent::None
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                UserIntent::None
            }
            KeyCode::Right => {
                self.cursor = (self.cursor + 1).min(input.chars().count());
                UserIntent::None
            }
            KeyCode::Home => {
                self.cursor = 0;
                UserIntent::None
            }
            KeyCode::End => {
                self.cursor = input.chars().count();
                UserIntent::None
            }
            _ => UserIntent::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API — Tui struct
// ---------------------------------------------------------------------------

/// Owns the ratatui terminal and all UI-layer state.
///
/// The client orchestrator ([`crate::client`]) drives this struct: call
/// [`Tui::render`] each frame and [`Tui::poll_and_handle_input`] to process
/// keyboard events.
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    state: TuiState,
}

impl Tui {
    /// Set up the terminal (raw mode, alternate screen) and return a ready `Tui`.
    pub fn setup() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self {
            terminal,
            state: TuiState::default(),
        })
    }

    /// Restore the terminal to its original state.
    pub fn teardown(&mut self) -> io::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    /// Draw the current frame.
    pub fn render(&mut self, chat: &ChatState) -> io::Result<()> {
        self.state.clamp_cursor(&chat.input);
        self.terminal.draw(|f| ui(f, chat, &self.state))?;
        Ok(())
    }

    /// Poll for a keyboard event and, if one is available, apply it to the
    /// input line and translate it into a [`UserIntent`]. This never blocks.
    pub fn poll_and_handle_input(&mut self, chat: &mut ChatState) -> io::Result<UserIntent> {
        if !event::poll(std::time::Duration::from_millis(0))? {
            return Ok(UserIntent::None);
        }
        let Event::Key(key) = event::read()? else {
            return Ok(UserIntent::None);
        };
        if key.kind != KeyEventKind::Press {
            return Ok(UserIntent::None);
        }
        Ok(self.state.handle_key(key, &mut chat.input))
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn ui(frame: &mut Frame, chat: &ChatState, tui: &TuiState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Scrollback
            Constraint::Length(1), // Latest notice
            Constraint::Length(3), // Input line
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_scrollback(frame, chat, layout[0]);
    render_notice(frame, chat, layout[1]);
    render_input(frame, chat, tui, layout[2]);
    render_status(frame, chat, layout[3]);

    if tui.show_help {
        render_help_popup(frame);
    }
}

fn render_scrollback(frame: &mut Frame, chat: &ChatState, area: Rect) {
    let own_prefix = format!("{}: ", chat.nickname);
    let lines: Vec<ListItem> = chat
        .scrollback
        .iter()
        .rev()
        .take(area.height.saturating_sub(2) as usize)
        .rev()
        .map(|line| {
            let style = if line.starts_with(&own_prefix) {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(Span::styled(line.as_str(), style))
        })
        .collect();

    let list = List::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Chat ")
            .title_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(list, area);
}

fn render_notice(frame: &mut Frame, chat: &ChatState, area: Rect) {
    let Some(notice) = chat.latest_notice() else {
        return;
    };
    let color = match notice {
        Notice::Rejected(_) | Notice::SendFailed(_) => Color::Yellow,
        Notice::ConnectionLost | Notice::Error(_) => Color::Red,
    };
    let text = Paragraph::new(Span::styled(notice.to_string(), Style::default().fg(color)));
    frame.render_widget(text, area);
}

fn render_input(frame: &mut Frame, chat: &ChatState, tui: &TuiState, area: Rect) {
    let input = Paragraph::new(chat.input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Message ")
            .title_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(input, area);

    if !tui.show_help {
        #[allow(clippy::cast_possible_truncation)]
        let cursor_x = area.x + 1 + tui.cursor as u16;
        frame.set_cursor_position((cursor_x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}

fn render_status(frame: &mut Frame, chat: &ChatState, area: Rect) {
    let (status_text, status_color) = match &chat.status {
        SessionStatus::Connecting => ("● Connecting", Color::Yellow),
        SessionStatus::Connected => ("● Connected", Color::Green),
        SessionStatus::Ended(_) => ("● Disconnected", Color::Red),
    };
    let status = Paragraph::new(Line::from(vec![
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw(" | "),
        Span::styled("F1", Style::default().fg(Color::Cyan).bold()),
        Span::raw(": Help | "),
        Span::styled("ESC", Style::default().fg(Color::Cyan).bold()),
        Span::raw(": Quit | You: "),
        Span::styled(chat.nickname.as_str(), Style::default().fg(Color::Cyan)),
    ]));
    frame.render_widget(status, area);
}

fn render_help_popup(frame: &mut Frame) {
    let area = centered_rect(50, 40, frame.area());
    frame.render_widget(Clear, area);

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Cyan).bold());
    let lines = vec![
        Line::from(vec![key("Enter"), Span::raw("  send the message")]),
        Line::from(vec![key("Ctrl+L"), Span::raw(" clear the chat history")]),
        Line::from(vec![key("Esc"), Span::raw("    leave the chat")]),
        Line::from(vec![key("F1"), Span::raw("     toggle this help")]),
    ];
    let help = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Help ")
            .title_style(Style::default().fg(Color::Cyan).bold())
            .style(Style::default().bg(Color::Black)),
    );

    frame.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(tui: &mut TuiState, input: &mut String, text: &str) {
        for c in text.chars() {
            assert_eq!(tui.handle_key(press(KeyCode::Char(c)), input), UserIntent::None);
        }
    }

    #[test]
    fn typing_edits_at_the_cursor() {
        let mut tui = TuiState::default();
        let mut input = String::new();
        type_text(&mut tui, &mut input, "hllo");
        for _ in 0..3 {
            tui.handle_key(press(KeyCode::Left), &mut input);
        }
        type_text(&mut tui, &mut input, "e");
        assert_eq!(input, "hello");

        tui.handle_key(press(KeyCode::End), &mut input);
        tui.handle_key(press(KeyCode::Backspace), &mut input);
        assert_eq!(input, "hell");
    }

    #[test]
    fn enter_submits_and_resets_cursor() {
        let mut tui = TuiState::default();
        let mut input = String::new();
        type_text(&mut tui, &mut input, "hi");
        assert_eq!(tui.handle_key(press(KeyCode::Enter), &mut input), UserIntent::Submit);
        assert_eq!(tui.cursor, 0);
        // The controller, not the UI, clears the text.
        assert_eq!(input, "hi");
    }

    #[test]
    fn control_keys_map_to_intents() {
        let mut tui = TuiState::default();
        let mut input = String::new();
        let ctrl_l = KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL);
        assert_eq!(tui.handle_key(ctrl_l, &mut input), UserIntent::Reset);
        assert_eq!(tui.handle_key(press(KeyCode::Esc), &mut input), UserIntent::Quit);
        assert!(input.is_empty());
    }

    #[test]
    fn help_swallows_keys_until_closed() {
        let mut tui = TuiState::default();
        let mut input = String::new();
        tui.handle_key(press(KeyCode::F(1)), &mut input);
        assert!(tui.show_help);
        assert_eq!(tui.handle_key(press(KeyCode::Enter), &mut input), UserIntent::None);
        assert_eq!(tui.handle_key(press(KeyCode::Esc), &mut input), UserIntent::None);
        assert!(!tui.show_help);
    }

    #[test]
    fn multibyte_input_is_edited_by_character() {
        let mut tui = TuiState::default();
        let mut input = String::new();
        type_text(&mut tui, &mut input, "привет");
        tui.handle_key(press(KeyCode::Backspace), &mut input);
        assert_eq!(input, "приве");
        assert_eq!(tui.cursor, 5);
    }
}
