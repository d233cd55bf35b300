#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap};

use crate::config::Config;
use crate::output::format_date;
use crate::task::model::{Filter, Task};
use crate::task::storage::Persistence;
use crate::task::store::TaskStore;
use crate::tui::input::TextInput;
use crate::tui::{self, TerminalGuard};

const TOAST_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Adding,
    Editing,
}

#[derive(Debug, Clone)]
struct Toast {
    message: String,
    until: Instant,
}

pub struct App<P> {
    cfg: Config,
    store: TaskStore<P>,
    mode: Mode,
    new_task: TextInput,
    edit: TextInput,
    list_state: ListState,
    show_help: bool,
    should_quit: bool,
    toast: Option<Toast>,
}

impl<P: Persistence> App<P> {
    pub fn new(cfg: Config, store: TaskStore<P>) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        // An empty list starts in the input line, like the browser page.
        let mode = if store.tasks().is_empty() {
            Mode::Adding
        } else {
            Mode::Normal
        };
        Self {
            cfg,
            store,
            mode,
            new_task: TextInput::default(),
            edit: TextInput::default(),
            list_state,
            show_help: false,
            should_quit: false,
            toast: None,
        }
    }

    #[must_use]
    pub fn store(&self) -> &TaskStore<P> {
        &self.store
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    #[must_use]
    pub fn selected_index(&self) -> usize {
        self.list_state.selected().unwrap_or(0)
    }

    #[must_use]
    pub fn selected_task_id(&self) -> Option<u64> {
        self.store
            .visible_tasks()
            .get(self.selected_index())
            .map(|t| t.id)
    }

    fn clamp_selection(&mut self) {
        let len = self.store.visible_tasks().len();
        let idx = self.selected_index().min(len.saturating_sub(1));
        self.list_state.select(Some(idx));
    }

    fn move_selection(&mut self, delta: i64) {
        let len = self.store.visible_tasks().len();
        if len == 0 {
            return;
        }
        let cur = i64::try_from(self.selected_index()).unwrap_or(0);
        let max = i64::try_from(len - 1).unwrap_or(0);
        let next = usize::try_from((cur + delta).clamp(0, max)).unwrap_or(0);
        self.list_state.select(Some(next));
    }

    fn select_id(&mut self, id: u64) {
        if let Some(idx) = self.store.visible_tasks().iter().position(|t| t.id == id) {
            self.list_state.select(Some(idx));
        }
    }

    fn set_filter(&mut self, filter: Filter) {
        let keep = self.selected_task_id();
        self.store.set_filter(filter);
        self.list_state.select(Some(0));
        if let Some(id) = keep {
            self.select_id(id);
        }
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.toast = Some(Toast {
            message: message.into(),
            until: Instant::now() + TOAST_TTL,
        });
    }

    /// Routes one key press. Never fails; refusals show up as a toast.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c'))
        {
            self.should_quit = true;
            return;
        }

        match self.mode {
            Mode::Adding => self.handle_adding_key(key),
            Mode::Editing => self.handle_editing_key(key),
            Mode::Normal => self.handle_normal_key(key),
        }
    }

    fn handle_adding_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Enter => {
                if let Some(id) = self.store.add_task(self.new_task.as_str()) {
                    self.new_task.clear();
                    self.select_id(id);
                }
            }
            _ => {
                self.new_task.handle_key(key);
            }
        }
    }

    fn handle_editing_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.store.cancel_edit();
                self.mode = Mode::Normal;
            }
            KeyCode::Enter => {
                if self.store.save_edit() {
                    self.mode = Mode::Normal;
                    self.clamp_selection();
                } else {
                    self.notify("Task text must not be empty");
                }
            }
            _ => {
                if self.edit.handle_key(key) {
                    self.store.update_draft(self.edit.as_str());
                }
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        if self.show_help {
            // Any key closes the help popup.
            self.show_help = false;
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('a' | 'i') => self.mode = Mode::Adding,
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Home | KeyCode::Char('g') => self.list_state.select(Some(0)),
            KeyCode::End | KeyCode::Char('G') => self.move_selection(i64::MAX / 2),
            KeyCode::Tab | KeyCode::Right => self.set_filter(self.store.filter().next()),
            KeyCode::BackTab | KeyCode::Left => self.set_filter(self.store.filter().prev()),
            KeyCode::Char('1') => self.set_filter(Filter::All),
            KeyCode::Char('2') => self.set_filter(Filter::Pending),
            KeyCode::Char('3') => self.set_filter(Filter::Completed),
            KeyCode::Char(' ' | 'x') | KeyCode::Enter => {
                if let Some(id) = self.selected_task_id() {
                    self.store.toggle_complete(id);
                    // The task may have left the current filter.
                    self.clamp_selection();
                }
            }
            KeyCode::Char('e') => {
                if let Some(id) = self.selected_task_id()
                    && self.store.start_edit(id)
                {
                    self.edit = TextInput::new(self.store.edit_draft().unwrap_or_default());
                    self.mode = Mode::Editing;
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(id) = self.selected_task_id()
                    && self.store.delete_task(id)
                {
                    self.clamp_selection();
                    self.notify("Task deleted");
                }
            }
            _ => {}
        }
    }
}

pub async fn run<P: Persistence>(cfg: Config, store: TaskStore<P>) -> anyhow::Result<()> {
    let terminal = tui::init_terminal()?;
    let mut guard = TerminalGuard::new(terminal);
    let mut app = App::new(cfg, store);
    tracing::info!(tasks = app.store.tasks().len(), "tui started");

    loop {
        if let Some(toast) = &app.toast
            && Instant::now() >= toast.until
        {
            app.toast = None;
        }

        {
            let Some(terminal) = guard.terminal_mut() else {
                anyhow::bail!("terminal unavailable");
            };
            terminal.draw(|f| draw(f, &mut app))?;
        }

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(50))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.handle_key(key);
        }
    }

    tracing::info!("tui closed");
    Ok(())
}

fn draw<P: Persistence>(f: &mut Frame<'_>, app: &mut App<P>) {
    let area = f.area();

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(area);

    let title = Paragraph::new(Line::from(vec![
        Span::styled("✓ ", Style::default().fg(Color::LightBlue)),
        Span::styled("Task Tracker", Style::default().add_modifier(Modifier::BOLD)),
    ]))
    .alignment(Alignment::Center);
    f.render_widget(title, root[0]);

    draw_input(f, root[1], app);
    draw_counts(f, root[2], app);
    draw_filters(f, root[3], app);
    draw_tasks(f, root[4], app);
    draw_footer(f, root[5], app);

    if app.show_help {
        draw_help(f, area);
    }
}

fn draw_input<P: Persistence>(f: &mut Frame<'_>, area: Rect, app: &App<P>) {
    let active = app.mode == Mode::Adding;
    let border = if active {
        Style::default().fg(Color::LightBlue)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title("Add Task");
    let inner = block.inner(area);

    let line = if app.new_task.as_str().is_empty() && !active {
        Line::from(Span::styled(
            "What needs to be done today?  (press a)",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(app.new_task.as_str())
    };
    f.render_widget(Paragraph::new(line).block(block), area);

    if active {
        f.set_cursor_position((inner.x + cursor_x(app.new_task.cursor()), inner.y));
    }
}

fn draw_counts<P: Persistence>(f: &mut Frame<'_>, area: Rect, app: &App<P>) {
    let counts = app.store.counts();
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(area);

    let cards = [
        ("Total Tasks", counts.total, Color::White),
        ("Completed", counts.completed, Color::Green),
        ("Pending", counts.pending, Color::Yellow),
    ];
    for ((label, value, color), col) in cards.into_iter().zip(cols.iter()) {
        let card = Paragraph::new(Line::from(vec![
            Span::styled(
                value.to_string(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("  {label}")),
        ]))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(card, *col);
    }
}

fn draw_filters<P: Persistence>(f: &mut Frame<'_>, area: Rect, app: &App<P>) {
    let titles: Vec<Line> = Filter::ALL
        .iter()
        .enumerate()
        .map(|(i, filter)| Line::from(format!("{} [{}]", filter.title(), i + 1)))
        .collect();
    let selected = Filter::ALL
        .iter()
        .position(|x| *x == app.store.filter())
        .unwrap_or(0);

    let tabs = Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(Color::Gray))
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        )
        .divider(" | ");
    f.render_widget(tabs, area);
}

fn draw_tasks<P: Persistence>(f: &mut Frame<'_>, area: Rect, app: &mut App<P>) {
    let block = Block::default().borders(Borders::ALL).title("Tasks");
    let visible = app.store.visible_tasks();

    if visible.is_empty() {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from("No tasks yet"),
            Line::from(Span::styled(
                "Add your first task to get started!",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .alignment(Alignment::Center)
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    let editing = app.store.editing_id();
    let items: Vec<ListItem> = visible
        .iter()
        .map(|task| {
            if editing == Some(task.id) {
                edit_line(app.edit.as_str())
            } else {
                task_line(&app.cfg, task)
            }
        })
        .map(ListItem::new)
        .collect();
    let edit_row = editing.and_then(|id| visible.iter().position(|t| t.id == id));

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");
    let inner = Block::default().borders(Borders::ALL).inner(area);
    f.render_stateful_widget(list, area, &mut app.list_state);

    if app.mode == Mode::Editing
        && let Some(row) = edit_row
    {
        let offset = app.list_state.offset();
        if row >= offset {
            let y = inner.y + u16::try_from(row - offset).unwrap_or(0);
            // highlight symbol + "[ ] " prefix
            let x = inner.x + 2 + 4 + cursor_x(app.edit.cursor());
            if y < inner.y + inner.height {
                f.set_cursor_position((x, y));
            }
        }
    }
}

fn task_line<'a>(cfg: &Config, task: &'a Task) -> Line<'a> {
    let checkbox = match (cfg.ui.icons, task.completed) {
        (true, true) => Span::styled("✓ ", Style::default().fg(Color::Green)),
        (true, false) => Span::styled("○ ", Style::default().fg(Color::Gray)),
        (false, true) => Span::styled("[x] ", Style::default().fg(Color::Green)),
        (false, false) => Span::raw("[ ] "),
    };
    let text_style = if task.completed {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default()
    };

    let mut spans = vec![checkbox, Span::styled(task.text.as_str(), text_style)];
    if cfg.ui.show_dates {
        spans.push(Span::styled(
            format!("  {}", format_date(task.created_at)),
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

fn edit_line(draft: &str) -> Line<'_> {
    Line::from(vec![
        Span::styled("[~] ", Style::default().fg(Color::LightBlue)),
        Span::styled(
            draft,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::UNDERLINED),
        ),
    ])
}

fn draw_footer<P: Persistence>(f: &mut Frame<'_>, area: Rect, app: &App<P>) {
    if let Some(toast) = &app.toast {
        let line = Paragraph::new(Line::from(Span::styled(
            toast.message.as_str(),
            Style::default().fg(Color::Yellow),
        )));
        f.render_widget(line, area);
        return;
    }

    let help = match app.mode {
        Mode::Adding => "Enter add • Esc leave input",
        Mode::Editing => "Enter save • Esc cancel",
        Mode::Normal => {
            "a add • space toggle • e edit • d delete • Tab filter • j/k move • ? help • q quit"
        }
    };
    let footer = Paragraph::new(Line::from(Span::styled(
        help,
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(footer, area);
}

fn draw_help(f: &mut Frame<'_>, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    f.render_widget(Clear, popup_area);
    let lines = vec![
        Line::from("Keys:"),
        Line::from("  a / i        Focus the input line"),
        Line::from("  Enter        Add task (input) / toggle (list)"),
        Line::from("  Space / x    Toggle completed"),
        Line::from("  e            Edit selected task"),
        Line::from("  d / Del      Delete selected task"),
        Line::from("  Tab / 1-3    Change filter"),
        Line::from("  j/k, ↑/↓     Move"),
        Line::from("  Esc          Leave input / cancel edit"),
        Line::from("  q            Quit"),
    ];
    let popup = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: false });
    f.render_widget(popup, popup_area);
}

fn cursor_x(cursor: usize) -> u16 {
    u16::try_from(cursor).unwrap_or(u16::MAX)
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use ratatui::backend::TestBackend;

    use super::*;
    use crate::task::storage::MemoryStorage;

    fn press(app: &mut App<MemoryStorage>, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App<MemoryStorage>, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn new_app() -> App<MemoryStorage> {
        App::new(Config::default(), TaskStore::open(MemoryStorage::new()))
    }

    #[test]
    fn empty_store_starts_in_input() {
        let app = new_app();
        assert_eq!(app.mode(), Mode::Adding);
    }

    #[test]
    fn keys_drive_the_buy_milk_scenario() {
        let mut app = new_app();
        type_text(&mut app, "Buy milk");
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Esc);

        assert_eq!(app.store().tasks().len(), 1);
        assert_eq!(app.store().tasks()[0].text, "Buy milk");
        assert_eq!(app.mode(), Mode::Normal);

        press(&mut app, KeyCode::Char(' '));
        assert_eq!(app.store().counts().completed, 1);

        press(&mut app, KeyCode::Char('e'));
        assert_eq!(app.mode(), Mode::Editing);
        for _ in 0.."milk".len() {
            press(&mut app, KeyCode::Backspace);
        }
        type_text(&mut app, "oat milk");
        assert_eq!(app.store().edit_draft(), Some("Buy oat milk"));
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.mode(), Mode::Normal);
        assert_eq!(app.store().tasks()[0].text, "Buy oat milk");
        assert_eq!(app.store().editing_id(), None);
        assert_eq!(app.store().storage().writes(), 3);
    }

    #[test]
    fn blank_input_adds_nothing() {
        let mut app = new_app();
        type_text(&mut app, "   ");
        press(&mut app, KeyCode::Enter);
        assert!(app.store().tasks().is_empty());
        assert_eq!(app.store().storage().writes(), 0);
    }

    #[test]
    fn escape_cancels_edit() {
        let mut app = new_app();
        type_text(&mut app, "original");
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Esc);

        press(&mut app, KeyCode::Char('e'));
        type_text(&mut app, " garbage");
        press(&mut app, KeyCode::Esc);

        assert_eq!(app.mode(), Mode::Normal);
        assert_eq!(app.store().tasks()[0].text, "original");
        assert_eq!(app.store().editing_id(), None);
    }

    #[test]
    fn blank_edit_stays_open() {
        let mut app = new_app();
        type_text(&mut app, "ab");
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Esc);

        press(&mut app, KeyCode::Char('e'));
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.mode(), Mode::Editing);
        assert!(app.toast.is_some());
        assert_eq!(app.store().tasks()[0].text, "ab");
    }

    #[test]
    fn filters_and_delete_follow_selection() {
        let mut app = new_app();
        for text in ["one", "two", "three"] {
            type_text(&mut app, text);
            press(&mut app, KeyCode::Enter);
        }
        press(&mut app, KeyCode::Esc);
        let ids: Vec<u64> = app.store().tasks().iter().map(|t| t.id).collect();
        assert_eq!(app.selected_task_id(), Some(ids[2]));

        press(&mut app, KeyCode::Char('k'));
        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Char('3'));
        assert_eq!(app.store().filter(), Filter::Completed);
        assert_eq!(app.selected_task_id(), Some(ids[1]));

        press(&mut app, KeyCode::Char('2'));
        let visible: Vec<u64> = app.store().visible_tasks().iter().map(|t| t.id).collect();
        assert_eq!(visible, vec![ids[0], ids[2]]);

        press(&mut app, KeyCode::Char('G'));
        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.store().tasks().len(), 2);
        assert!(app.store().get(ids[2]).is_none());
        assert_eq!(app.selected_task_id(), Some(ids[0]));
    }

    #[test]
    fn quit_keys() {
        let mut app = new_app();
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit());

        let mut app = new_app();
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_quit(), "q is text while the input is focused");
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit());
    }

    #[test]
    fn renders_counts_and_empty_state() {
        let mut app = new_app();
        let mut terminal = ratatui::Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();
        let screen = buffer_text(terminal.backend().buffer());
        assert!(screen.contains("No tasks yet"));
        assert!(screen.contains("Total Tasks"));

        type_text(&mut app, "Water plants");
        press(&mut app, KeyCode::Enter);
        terminal.draw(|f| draw(f, &mut app)).unwrap();
        let screen = buffer_text(terminal.backend().buffer());
        assert!(screen.contains("Water plants"));
        assert!(!screen.contains("No tasks yet"));
    }

    fn buffer_text(buf: &ratatui::buffer::Buffer) -> String {
        let mut out = String::new();
        for y in 0..buf.area.height {
            for x in 0..buf.area.width {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }
}
