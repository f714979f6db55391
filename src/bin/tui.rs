mod tui_app;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use tui_app::{format_ms, format_pct, format_uptime, truncate, AppState, ConnectionStatus};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut table_state = TableState::default();
    table_state.select(None);

    let result = run_loop(&mut terminal, &mut app, &client, &mut table_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
    table_state: &mut TableState,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(5);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app, table_state))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Tab => {
                            app.view = app.view.toggle();
                            table_state.select(None);
                        }
                        KeyCode::Char('s') | KeyCode::Char('S') => app.sort = app.sort.next(),
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.displayed().len().saturating_sub(1);
                            let next = table_state.selected().map_or(0, |i| (i + 1).min(max));
                            table_state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let prev = table_state
                                .selected()
                                .map_or(0, |i| i.saturating_sub(1));
                            table_state.select(Some(prev));
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, table_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_performance_table(f, app, table_state, chunks[1]);
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };
    let (market_text, market_color) = if app.health.market_open {
        ("market open", Color::Green)
    } else {
        ("market closed", Color::DarkGray)
    };
    let counts = &app.health.counts;

    let fields: [(String, Color); 5] = [
        (status_text, status_color),
        (market_text.to_string(), market_color),
        (
            format!(
                "{} stocks · {} perf · {} daily · {} intraday",
                counts.stocks, counts.performance, counts.daily_candles, counts.candles
            ),
            Color::White,
        ),
        (
            format!(
                "p50 {} · p99 {} ({} req)",
                format_ms(app.latency.p50_ms),
                format_ms(app.latency.p99_ms),
                app.latency.sample_count
            ),
            Color::White,
        ),
        (format!("up {}", format_uptime(app.health.uptime_secs)), Color::DarkGray),
    ];

    let mut title_spans = vec![Span::styled(
        " Stock Store  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    for (i, (text, color)) in fields.into_iter().enumerate() {
        if i > 0 {
            title_spans.push(Span::raw("  │  "));
        }
        title_spans.push(Span::styled(text, Style::default().fg(color)));
    }

    f.render_widget(Paragraph::new(Line::from(title_spans)).block(panel("")), area);
}

fn pct_color(v: f64) -> Color {
    if v >= 5.0 {
        Color::Green
    } else if v >= 0.0 {
        Color::LightGreen
    } else if v > -5.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn render_performance_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["#", "Name", "1M", "3M", "6M", "1Y"].iter().map(|h| {
        let style = if *h == app.sort.label() {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        };
        Cell::from(*h).style(style)
    });
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .displayed()
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let pct_cell = |v: f64| Cell::from(format_pct(v)).style(Style::default().fg(pct_color(v)));
            Row::new(vec![
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&p.ticker, 36)),
                pct_cell(p.perf_1m),
                pct_cell(p.perf_3m),
                pct_cell(p.perf_6m),
                pct_cell(p.perf_1y),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Min(12),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(panel(app.view.title()))
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(table, area, state);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let sort = format!("sort ({})", app.sort.label());
    let mut spans = Vec::new();
    for (key, label) in [
        ("q", "quit"),
        ("r", "refresh"),
        ("tab", "sectors/industries"),
        ("s", sort.as_str()),
        ("↑↓ / j k", "scroll"),
    ] {
        spans.push(Span::styled(format!(" [{key}] "), Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(label.to_string()));
    }
    spans.push(Span::styled("  auto-refresh: 5s", Style::default().fg(Color::DarkGray)));

    f.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::White)),
        area,
    );
}

/// Bordered panel, titled when `title` is non-empty.
fn panel(title: &str) -> Block<'_> {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    if title.is_empty() {
        return block;
    }
    block.title(Span::styled(
        title,
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))
}
