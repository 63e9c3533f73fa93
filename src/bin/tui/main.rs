mod app;

use std::io;
use std::time::Duration;

use app::{format_kickoff, truncate, AppState, ConnectionStatus};
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

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);
    app.refresh(&client).await;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut games_state = TableState::default();
    games_state.select(None);

    let result = run_loop(&mut terminal, &mut app, &client, &mut games_state).await;

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
    games_state: &mut TableState,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(10);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app, games_state))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.games.len().saturating_sub(1);
                            let next = games_state.selected().map_or(0, |i| (i + 1).min(max));
                            games_state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let prev = games_state.selected().map_or(0, |i| i.saturating_sub(1));
                            games_state.select(Some(prev));
                        }
                        KeyCode::Enter => {
                            if let Some(event_id) = app
                                .selected_game(games_state.selected())
                                .map(|g| g.event_id.clone())
                            {
                                app.fetch_game(client, &event_id).await;
                            }
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

fn render(f: &mut Frame, app: &AppState, games_state: &mut TableState) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, games_state, chunks[1]);
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let stats = &app.stats;
    let white = Style::default().fg(Color::White);

    let spans = vec![
        Span::styled(
            " Odds Props  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(format!("{} quotes", stats.total_props), white),
        Span::raw("  │  "),
        Span::styled(format!("{} players", stats.unique_subjects), white),
        Span::raw("  │  "),
        Span::styled(
            format!("{} games ({} today)", stats.total_games, stats.today_games),
            white,
        ),
        Span::raw("  │  "),
        Span::styled(format!("{} books", stats.unique_bookmakers), white),
        Span::raw("  │  "),
        Span::styled(
            format!("updated {}", format_kickoff(stats.last_update.as_deref())),
            Style::default().fg(Color::DarkGray),
        ),
    ];

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, games_state: &mut TableState, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    render_games_table(f, app, games_state, halves[0]);
    render_sheet_table(f, app, halves[1]);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).height(1)
}

fn render_games_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let rows: Vec<Row> = app
        .games
        .iter()
        .map(|g| {
            let loaded = app.detail.as_ref().is_some_and(|d| d.event_id == g.event_id);
            let style = if loaded {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(format_kickoff(g.commence_time.as_deref())),
                Cell::from(truncate(&format!("{} @ {}", g.away_team, g.home_team), 40)),
                Cell::from(format!("{}", g.subject_count)),
                Cell::from(format!("{}", g.bookmaker_count)),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(11),
        Constraint::Min(20),
        Constraint::Length(5),
        Constraint::Length(5),
    ];

    let title = match app.selected_game(state.selected()) {
        Some(g) if !g.sport_title.is_empty() => format!(" Games · {} ", g.sport_title),
        _ => format!(" Games ({}) ", app.games.len()),
    };

    let table = Table::new(rows, widths)
        .header(header_row(&["Start", "Matchup", "Subj", "Books"]))
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ");

    f.render_stateful_widget(table, area, state);
}

fn render_sheet_table(f: &mut Frame, app: &AppState, area: Rect) {
    let title = match &app.detail {
        Some(d) => format!(
            " {} @ {} · {} · {} quotes ",
            d.away_team,
            d.home_team,
            format_kickoff(d.commence_time.as_deref()),
            d.total_quotes
        ),
        None => " Select a game and press Enter ".to_string(),
    };

    let mut last_subject = String::new();
    let rows: Vec<Row> = app
        .quote_rows()
        .into_iter()
        .map(|r| {
            // Subject only on its first row
            let subject = if r.subject == last_subject {
                String::new()
            } else {
                last_subject = r.subject.clone();
                truncate(&r.subject, 22)
            };
            Row::new(vec![
                Cell::from(subject).style(Style::default().fg(Color::Green)),
                Cell::from(truncate(&r.prop_type, 18)),
                Cell::from(r.line),
                Cell::from(truncate(&r.bookmaker, 14)),
                Cell::from(r.prices),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(22),
        Constraint::Length(18),
        Constraint::Length(6),
        Constraint::Length(14),
        Constraint::Min(16),
    ];

    let table = Table::new(rows, widths)
        .header(header_row(&["Subject", "Prop", "Line", "Book", "Prices"]))
        .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let health = match (&app.health.status, app.health.records) {
        (Some(s), Some(n)) => format!("{s} · {n} rows · {} 5xx", app.health.server_errors.unwrap_or(0)),
        (Some(s), None) => s.clone(),
        _ => "health unknown".to_string(),
    };
    let text = format!(
        " [q] quit  [r] refresh  [↑↓/jk] select  [Enter] load sheets   │  {}  │  refreshed {}s ago",
        health,
        app.last_refresh.elapsed().as_secs()
    );
    let paragraph = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
    f.render_widget(paragraph, area);
}
