use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stupid_agent::event::ToolEventStatus;
use stupid_agent::{EventPayload, MessageRole, SessionSummary};
use tracing::debug;

struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const ASSISTANT_TEXT: Color = Color::Cyan;
    const TOOL_CALL: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
    const PLAN: Color = Color::Blue;
}

/// Manages terminal I/O for the interactive REPL.
pub struct Terminal {
    cancelled: Arc<AtomicBool>,
}

impl Terminal {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn print_banner(&self, mode: &str, detail: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("stupid-cli"),
            ResetColor,
            Print(" - Interactive Agent\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Mode: {} | {}\n", mode, detail)),
            Print("Type 'exit' or 'quit' to end. Ctrl+C cancels current operation.\n"),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    pub fn read_input(&self) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        execute!(stdout, Print("\n"), SetForegroundColor(Colors::USER_PROMPT), Print("you> "), ResetColor)?;
        stdout.flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let trimmed = input.trim().to_string();

        if trimmed.is_empty() {
            return Ok(Some(String::new()));
        }
        if trimmed == "exit" || trimmed == "quit" || trimmed == "/exit" || trimmed == "/quit" {
            return Ok(None);
        }
        Ok(Some(trimmed))
    }

    /// Render one session event (spec §3's event union) to the terminal.
    pub fn display_event(&self, payload: &EventPayload) -> Result<()> {
        let mut stdout = io::stdout();
        match payload {
            EventPayload::Plan { plan } => {
                execute!(
                    stdout,
                    Print("\n"),
                    SetForegroundColor(Colors::PLAN),
                    Print(format!("[plan] {} steps\n", plan.steps.len())),
                    ResetColor,
                )?;
            }
            EventPayload::Title { title } => {
                execute!(stdout, SetForegroundColor(Colors::DIM), Print(format!("[title] {title}\n")), ResetColor)?;
            }
            EventPayload::Step { step } => {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::PLAN),
                    Print(format!("[step] {}\n", step.description)),
                    ResetColor,
                )?;
            }
            EventPayload::Message { role: MessageRole::Assistant, message, .. } => {
                execute!(stdout, SetForegroundColor(Colors::ASSISTANT_TEXT), Print(message), Print("\n"), ResetColor)?;
            }
            EventPayload::Message { role: MessageRole::User, .. } => {
                // Already echoed locally when the user typed it.
            }
            EventPayload::Tool { function_name, status: ToolEventStatus::Calling, .. } => {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::TOOL_CALL),
                    Print(format!("[tool: {function_name}] ")),
                    ResetColor,
                )?;
            }
            EventPayload::Tool { function_name, status: ToolEventStatus::Called, .. } => {
                execute!(stdout, SetForegroundColor(Colors::DIM), Print(format!("[{function_name} done]\n")), ResetColor)?;
            }
            EventPayload::Wait => {
                execute!(stdout, SetForegroundColor(Colors::DIM), Print("[waiting for your reply]\n"), ResetColor)?;
            }
            EventPayload::Done => {
                debug!("turn done");
            }
            EventPayload::Error { message } => {
                execute!(
                    stdout,
                    Print("\n"),
                    SetForegroundColor(Colors::ERROR),
                    Print(format!("[error: {message}]\n")),
                    ResetColor,
                )?;
            }
        }
        stdout.flush()?;
        Ok(())
    }

    pub fn start_spinner(&self, message: &str) -> Result<SpinnerHandle> {
        let mut stdout = io::stdout();
        execute!(stdout, SetForegroundColor(Colors::DIM), Print(format!("{message} ")), ResetColor)?;
        stdout.flush()?;

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = std::thread::spawn(move || {
            let frames = ['|', '/', '-', '\\'];
            let mut i = 0;
            while running_clone.load(Ordering::SeqCst) {
                let mut stdout = io::stdout();
                execute!(stdout, SetForegroundColor(Colors::DIM), Print(format!("\r{} ", frames[i % frames.len()])), ResetColor).ok();
                stdout.flush().ok();
                i += 1;
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            let mut stdout = io::stdout();
            execute!(stdout, Print("\r  \r")).ok();
            stdout.flush().ok();
        });

        Ok(SpinnerHandle { running, _thread: handle })
    }

    pub fn print_sessions(&self, sessions: &[SessionSummary]) -> Result<()> {
        let mut stdout = io::stdout();
        if sessions.is_empty() {
            execute!(stdout, SetForegroundColor(Colors::DIM), Print("No sessions found.\n"), ResetColor)?;
            return Ok(());
        }

        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("Sessions:\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("{:<38} {:<12} {:<20} {:<6}\n", "ID", "STATUS", "TITLE", "UNREAD")),
            Print(format!("{}\n", "-".repeat(80))),
            ResetColor,
        )?;

        for s in sessions {
            execute!(
                stdout,
                Print(format!(
                    "{:<38} {:<12} {:<20} {:<6}\n",
                    s.id,
                    format!("{:?}", s.status),
                    if s.title.len() > 18 { format!("{}...", &s.title[..15]) } else { s.title.clone() },
                    s.unread_count,
                )),
            )?;
        }

        stdout.flush()?;
        Ok(())
    }

    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, SetForegroundColor(Colors::ERROR), Print(format!("Error: {msg}\n")), ResetColor)?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, SetForegroundColor(Colors::DIM), Print(format!("{msg}\n")), ResetColor)?;
        stdout.flush()?;
        Ok(())
    }
}

/// Handle to a running spinner. Drop or call stop() to terminate it.
pub struct SpinnerHandle {
    running: Arc<AtomicBool>,
    _thread: std::thread::JoinHandle<()>,
}

impl SpinnerHandle {
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for SpinnerHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_creation() {
        let term = Terminal::new();
        assert!(!term.is_cancelled());
    }

    #[test]
    fn cancellation_token() {
        let term = Terminal::new();
        let token = term.cancellation_token();
        assert!(!token.load(Ordering::SeqCst));
        token.store(true, Ordering::SeqCst);
        assert!(term.is_cancelled());
        term.reset_cancel();
        assert!(!term.cancelled.load(Ordering::SeqCst));
    }
}
