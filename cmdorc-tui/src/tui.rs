use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{debug, info, trace};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::app::{App, TreeRow};
use crate::keyboard::key_token;
use crate::notifier::Severity;
use crate::orchestrator::Orchestrator;

const TICK_RATE: Duration = Duration::from_millis(200);
const LOG_ROWS: usize = 6;

pub fn run<O: Orchestrator>(app: &mut App<O>) -> Result<()> {
    info!("Initializing TUI");
    enable_raw_mode().context("Failed to enable raw mode")?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;
    info!("Terminal initialized");

    let res = run_loop(&mut terminal, app);

    trace!("Cleaning up TUI");
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    info!("TUI cleanup completed");

    res
}

/// What a key press asks the loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn run_loop<O: Orchestrator>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App<O>,
) -> Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal
            .draw(|frame| draw(frame, app))
            .context("Failed to draw frame")?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout).context("Failed to poll for events")? {
            match event::read().context("Failed to read event")? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if handle_key(app, key) == Flow::Quit {
                        info!("Quit requested");
                        return Ok(());
                    }
                }
                Event::Resize(width, height) => {
                    debug!("Terminal resized: {}x{}", width, height);
                }
                other => trace!("Other event: {:?}", other),
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            let events = app.tick();
            if !events.is_empty() {
                trace!("{} controller events this tick", events.len());
            }
            last_tick = Instant::now();
        }
    }
}

fn handle_key<O: Orchestrator>(app: &mut App<O>, key: KeyEvent) -> Flow {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => return Flow::Quit,
        KeyCode::Esc if app.show_help => app.show_help = false,
        KeyCode::Esc => return Flow::Quit,
        KeyCode::Char('r') if ctrl => {
            info!("Reload requested");
            app.reload();
        }
        KeyCode::Char('h') if ctrl => app.show_help = !app.show_help,
        KeyCode::Char('?') => app.show_help = !app.show_help,
        KeyCode::Down => app.move_next(),
        KeyCode::Up => app.move_prev(),
        KeyCode::Enter => app.toggle_selected(),
        _ => match key_token(&key) {
            Some(token) => {
                if !app.press_shortcut(&token) {
                    trace!("Unbound key [{}]", token);
                }
            }
            None => trace!("Unhandled key: {:?}", key.code),
        },
    }
    Flow::Continue
}

fn draw<O: Orchestrator>(frame: &mut Frame, app: &App<O>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(LOG_ROWS as u16 + 2),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], app);
    draw_body(frame, chunks[1], app);
    draw_logs(frame, chunks[2], app);
    if app.show_help {
        draw_help(frame, app);
    }
}

fn draw_header<O: Orchestrator>(frame: &mut Frame, area: Rect, app: &App<O>) {
    let style = if app.validation.warnings.is_empty() {
        Style::default()
    } else {
        Style::default().fg(Color::Yellow)
    };
    let header = Paragraph::new(app.header())
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("cmdorc"))
        .wrap(Wrap { trim: true });
    frame.render_widget(header, area);
}

fn draw_body<O: Orchestrator>(frame: &mut Frame, area: Rect, app: &App<O>) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let items: Vec<ListItem> = app.rows.iter().map(|row| tree_item(app, row)).collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Commands"))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    let mut state = ListState::default();
    if !app.rows.is_empty() {
        state.select(Some(app.selected));
    }
    frame.render_stateful_widget(list, chunks[0], &mut state);

    let details = Paragraph::new(app.details())
        .block(Block::default().borders(Borders::ALL).title("Details"))
        .wrap(Wrap { trim: false });
    frame.render_widget(details, chunks[1]);
}

fn tree_item<'a, O: Orchestrator>(app: &App<O>, row: &TreeRow) -> ListItem<'a> {
    let state = app.state(&row.name);
    let icon = state.map(|s| s.icon.clone()).unwrap_or_default();
    let style = match state {
        Some(s) if s.running => Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        Some(s) if s.icon == "❌" => Style::default().fg(Color::Red),
        Some(s) if s.icon == "✅" => Style::default().fg(Color::Green),
        _ => Style::default(),
    };

    let mut spans = vec![
        Span::styled(row.prefix.clone(), Style::default().fg(Color::DarkGray)),
        Span::raw(format!("{icon} ")),
        Span::styled(row.name.clone(), style),
    ];
    if let Some(hint) = app.key_hint(&row.name) {
        let color = if hint.shadowed {
            Color::Yellow
        } else {
            Color::Cyan
        };
        spans.push(Span::styled(
            format!(" {}", hint.label()),
            Style::default().fg(color),
        ));
    }
    if row.duplicate {
        spans.push(Span::styled(" ↳", Style::default().fg(Color::DarkGray)));
    }
    ListItem::new(Line::from(spans))
}

fn draw_logs<O: Orchestrator>(frame: &mut Frame, area: Rect, app: &App<O>) {
    let notices = app.notices();
    let lines = notices
        .iter()
        .rev()
        .take(LOG_ROWS)
        .rev()
        .map(|notice| {
            let style = match notice.severity {
                Severity::Info => Style::default(),
                Severity::Warning => Style::default().fg(Color::Yellow),
                Severity::Error => Style::default().fg(Color::Red),
            };
            Line::from(vec![
                Span::styled(
                    notice.at.format("%H:%M:%S ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(notice.message.clone(), style),
            ])
        })
        .collect::<Vec<_>>();
    let log_widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Log"))
        .wrap(Wrap { trim: true });
    frame.render_widget(log_widget, area);
}

fn draw_help<O: Orchestrator>(frame: &mut Frame, app: &App<O>) {
    let area = centered(frame.size(), 60, 60);
    let help = Paragraph::new(app.help_text())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help (Esc to close)"),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(Clear, area);
    frame.render_widget(help, area);
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
