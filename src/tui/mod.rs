#![forbid(unsafe_code)]

pub mod app;
pub mod input;

use std::io;
use std::io::IsTerminal as _;

use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::error::TaskflowError;

pub type Term = Terminal<CrosstermBackend<io::Stdout>>;

#[must_use]
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

pub fn init_terminal() -> Result<Term, TaskflowError> {
    use crossterm::terminal::enable_raw_mode;

    enable_raw_mode()
        .map_err(|e| TaskflowError::Other(format!("failed to enable raw mode: {e}")))?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)
        .map_err(|e| TaskflowError::Other(format!("failed to enter alt screen: {e}")))?;
    Terminal::new(CrosstermBackend::new(stdout))
        .map_err(|e| TaskflowError::Other(format!("failed to create terminal: {e}")))
}

pub fn restore_terminal(mut terminal: Term) -> Result<(), TaskflowError> {
    use crossterm::terminal::disable_raw_mode;

    disable_raw_mode()
        .map_err(|e| TaskflowError::Other(format!("failed to disable raw mode: {e}")))?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )
    .map_err(|e| TaskflowError::Other(format!("failed to leave alt screen: {e}")))?;
    terminal
        .show_cursor()
        .map_err(|e| TaskflowError::Other(format!("failed to show cursor: {e}")))?;
    Ok(())
}

/// Restores the terminal on drop, including when the event loop bails.
pub struct TerminalGuard {
    terminal: Option<Term>,
}

impl TerminalGuard {
    #[must_use]
    pub fn new(terminal: Term) -> Self {
        Self {
            terminal: Some(terminal),
        }
    }

    pub fn terminal_mut(&mut self) -> Option<&mut Term> {
        self.terminal.as_mut()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(terminal) = self.terminal.take()
            && let Err(e) = restore_terminal(terminal)
        {
            tracing::warn!(error = %e, "failed to restore terminal");
        }
    }
}
