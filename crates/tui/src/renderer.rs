use std::io::stdout;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind, MouseEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ledger_feed_core::{Activation, Lane, LanePhase};
use ledger_feed_protocol::FilterCriteria;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table, Tabs},
};
use serde_json::Value;

use crate::app::{App, InputMode};

/// Rows scrolled per mouse wheel notch.
const WHEEL_STEP: isize = 3;

/// What one frame needs from the active lane, copied out under the lock.
struct LaneFrame {
    rows: Vec<[String; 4]>,
    held: usize,
    total: u64,
    has_more: bool,
    phase: LanePhase,
    error: Option<String>,
    filter: FilterCriteria,
}

impl LaneFrame {
    fn capture(lane: &Lane<Value>, offset: usize, visible: usize) -> Self {
        let rows = lane
            .records()
            .iter()
            .skip(offset)
            .take(visible)
            .map(summarize)
            .collect();
        Self {
            rows,
            held: lane.len(),
            total: lane.total_count(),
            has_more: lane.cursor().has_more,
            phase: lane.phase(),
            error: lane.error().map(ToString::to_string),
            filter: lane.filter().clone(),
        }
    }
}

pub fn run_tui(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn event_loop(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, app: &mut App) -> Result<()> {
    while !app.quit {
        if app.take_dirty() {
            terminal.draw(|frame| draw(frame, app))?;
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.on_key(key.code),
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollDown => {
                        app.scroll_by(WHEEL_STEP);
                        app.mark_dirty();
                    }
                    MouseEventKind::ScrollUp => {
                        app.scroll_by(-WHEEL_STEP);
                        app.mark_dirty();
                    }
                    _ => {}
                },
                Event::Resize(..) => app.mark_dirty(),
                _ => {}
            }
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame<'_>, app: &mut App) {
    let [tabs_area, filter_area, table_area, status_area, help_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(4),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    // borders and header row
    app.visible_rows = usize::from(table_area.height.saturating_sub(3)).max(1);

    draw_tabs(frame, app, tabs_area);

    let Some(lane) = app.active_lane().cloned() else {
        frame.render_widget(
            Paragraph::new("no lanes configured"),
            table_area,
        );
        return;
    };

    let held = app.feed().with_lane(&lane, Lane::len).unwrap_or(0);
    app.clamp_scroll(held);
    let (offset, selected) = app.scroll_position();
    let Some(view) = app
        .feed()
        .with_lane(&lane, |l| LaneFrame::capture(l, offset, app.visible_rows))
    else {
        return;
    };

    draw_filter(frame, app, &view, filter_area);
    draw_table(frame, &view, offset, selected, table_area);
    draw_status(frame, app, &view, status_area);

    let help = " ←/→ tab  ↑/↓ scroll  / search  s/e dates  a apply  c/d clear  m more  r retry  R reload  x dismiss  q quit ";
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::White).bg(Color::DarkGray)),
        help_area,
    );
}

fn draw_tabs(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let titles: Vec<Line<'_>> = app
        .lanes()
        .iter()
        .map(|id| {
            let marker = match app.feed().activation(id) {
                Some(Activation::Loading) => " …",
                Some(Activation::Loaded) => "",
                _ => " ·",
            };
            Line::from(format!("{id}{marker}"))
        })
        .collect();
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(" ledger feed "))
        .select(app.tab_index())
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, area);
}

fn draw_filter(frame: &mut Frame<'_>, app: &App, view: &LaneFrame, area: Rect) {
    let line = match &app.mode {
        InputMode::Search(buf) => editing("search", buf),
        InputMode::StartDate(buf) => editing("from (YYYY-MM-DD)", buf),
        InputMode::EndDate(buf) => editing("to (YYYY-MM-DD)", buf),
        InputMode::Normal => {
            let applied = &view.filter;
            let date = |d: Option<chrono::NaiveDate>| d.map_or("…".to_string(), |d| d.to_string());
            let draft = app
                .active_lane()
                .and_then(|id| app.feed().filter_draft(id))
                .unwrap_or_default();
            let pending = if draft == *applied { "" } else { "  (unapplied changes)" };
            Line::from(vec![
                Span::styled(" filter ", Style::default().fg(Color::Cyan)),
                Span::raw(format!(
                    "search: {:?}  dates: {} – {}{pending}",
                    applied.search,
                    date(applied.start_date),
                    date(applied.end_date),
                )),
            ])
        }
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn editing<'a>(label: &'a str, buf: &'a str) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!(" {label}: "), Style::default().fg(Color::Yellow)),
        Span::raw(buf),
        Span::styled("█", Style::default().fg(Color::Yellow)),
    ])
}

fn draw_table(frame: &mut Frame<'_>, view: &LaneFrame, offset: usize, selected: usize, area: Rect) {
    let rows = view.rows.iter().enumerate().map(|(i, cells)| {
        let row = Row::new(cells.iter().map(String::as_str));
        if offset + i == selected {
            row.style(Style::default().bg(Color::DarkGray))
        } else {
            row
        }
    });
    let footer = match view.phase {
        LanePhase::Loading(mode) => format!(" loading ({mode}) "),
        LanePhase::Exhausted => " end of list ".to_string(),
        LanePhase::Empty => " no records ".to_string(),
        LanePhase::Error => " failed ".to_string(),
        LanePhase::Populated => " ".to_string(),
    };
    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Fill(1),
            Constraint::Length(12),
            Constraint::Length(12),
        ],
    )
    .header(
        Row::new(["id", "name", "date", "amount"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(
                " {} of {}{} ",
                view.held,
                view.total,
                if view.has_more { "+" } else { "" }
            ))
            .title_bottom(footer),
    );
    frame.render_widget(table, area);
}

fn draw_status(frame: &mut Frame<'_>, app: &App, view: &LaneFrame, area: Rect) {
    let line = if let Some(err) = &view.error {
        Line::from(Span::styled(
            format!(" {err}  (r retry, x dismiss)"),
            Style::default().fg(Color::Red),
        ))
    } else if let Some(msg) = app.status() {
        Line::from(Span::styled(format!(" {msg}"), Style::default().fg(Color::Yellow)))
    } else {
        Line::default()
    };
    frame.render_widget(Paragraph::new(line), area);
}

/// Pull the columns shown in the table out of a loosely-shaped record.
fn summarize(record: &Value) -> [String; 4] {
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| record.get(*k))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };
    let mut date = field(&["date", "createdAt", "created_at", "transactionDate"]);
    if let Some(day) = date.get(..10) {
        date = day.to_string();
    }
    [
        field(&["id", "code", "number"]),
        field(&["name", "description", "reference", "customerName", "vendorName"]),
        date,
        field(&["amount", "total", "balance"]),
    ]
}
