//! Terminal host: draws the document and feeds key presses to the router.

use crossterm::{
    event::{self, Event as CrosstermEvent, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    layout::{Constraint, Direction, Layout},
    prelude::CrosstermBackend,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Tabs, Wrap},
};
use solar_nexus::application::APP_ERROR_ATTR;
use solar_nexus::router::{ROUTE_ERROR_ATTR, WILDCARD};
use solar_nexus::{App, EventName, Router, Theme};
use std::io::{self, stdout};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Navigate(String),
    Back,
    Forward,
    ToggleTheme,
    Quit,
}

/// Map a key press to an action. Number keys pick from `targets`, one-based.
pub fn key_action(code: KeyCode, targets: &[(String, String)]) -> Option<KeyAction> {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('t') => Some(KeyAction::ToggleTheme),
        KeyCode::Left => Some(KeyAction::Back),
        KeyCode::Right => Some(KeyAction::Forward),
        KeyCode::Char(c) => {
            let index = c.to_digit(10)?.checked_sub(1)? as usize;
            targets
                .get(index)
                .map(|(path, _)| KeyAction::Navigate(path.clone()))
        }
        _ => None,
    }
}

/// Routes reachable from the nav bar as `(path, title)`.
pub fn nav_targets(router: &Router) -> Vec<(String, String)> {
    router
        .routes()
        .into_iter()
        .filter(|(path, _)| path != WILDCARD && !path.contains(':'))
        .map(|(path, config)| (path, config.title))
        .collect()
}

/// Everything one frame needs, captured up front so no lock is held while
/// drawing.
struct View {
    title: String,
    location: String,
    targets: Vec<(String, String)>,
    body: String,
    theme: Theme,
    can_go_back: bool,
    can_go_forward: bool,
    failed: bool,
    last_error: Option<String>,
}

impl View {
    fn capture(app: &App) -> Self {
        let document = app.context().document();
        let router = app.router();
        let location = router.location();
        Self {
            title: document.title(),
            targets: nav_targets(router),
            body: document.text_content(app.container()),
            theme: app.preferences().theme,
            can_go_back: router.can_go_back(),
            can_go_forward: router.can_go_forward(),
            failed: !document.query_attribute(APP_ERROR_ATTR).is_empty()
                || !document.query_attribute(ROUTE_ERROR_ATTR).is_empty(),
            last_error: app.context().reporter().recent().pop().map(|r| r.message),
            location,
        }
    }

    fn accent(&self) -> Color {
        if self.failed {
            return Color::Red;
        }
        match self.theme {
            Theme::Dark => Color::Yellow,
            Theme::Light | Theme::System => Color::Cyan,
        }
    }
}

fn draw(frame: &mut Frame, view: &View) {
    let accent = view.accent();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Length(3), // Nav
            Constraint::Min(0),    // Page
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(&view.title, Style::default().fg(accent).add_modifier(Modifier::BOLD)),
        Span::styled(format!("  {}", view.location), Style::default().fg(Color::DarkGray)),
    ]))
    .block(Block::default().borders(Borders::ALL).border_type(BorderType::Rounded));
    frame.render_widget(header, chunks[0]);

    let selected = view.targets.iter().position(|(path, _)| *path == view.location);
    let mut tabs = Tabs::new(
        view.targets
            .iter()
            .enumerate()
            .map(|(i, (_, title))| Line::from(format!("{} {}", i + 1, title)))
            .collect::<Vec<_>>(),
    )
    .highlight_style(Style::default().fg(accent).add_modifier(Modifier::BOLD))
    .block(Block::default().borders(Borders::ALL).border_type(BorderType::Rounded));
    if let Some(selected) = selected {
        tabs = tabs.select(selected);
    }
    frame.render_widget(tabs, chunks[1]);

    let page = Paragraph::new(view.body.lines().map(Line::from).collect::<Vec<_>>())
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(accent)),
        );
    frame.render_widget(page, chunks[2]);

    let history = match (view.can_go_back, view.can_go_forward) {
        (true, true) => "← →",
        (true, false) => "←",
        (false, true) => "→",
        (false, false) => "",
    };
    let mut footer = vec![
        Span::styled(" 1-9 ", Style::default().fg(Color::Black).bg(accent)),
        Span::raw(" navigate  "),
        Span::styled(" t ", Style::default().fg(Color::Black).bg(accent)),
        Span::raw(format!(" theme ({})  ", view.theme.as_str())),
        Span::styled(" q ", Style::default().fg(Color::Black).bg(accent)),
        Span::raw(" quit  "),
        Span::styled(history, Style::default().fg(Color::DarkGray)),
    ];
    if let Some(error) = &view.last_error {
        footer.push(Span::styled(format!("  {error}"), Style::default().fg(Color::Red)));
    }
    let footer = Paragraph::new(Line::from(footer))
        .block(Block::default().borders(Borders::ALL).border_type(BorderType::Rounded));
    frame.render_widget(footer, chunks[3]);
}

/// Run the terminal until the user quits.
pub async fn run(app: &App) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(app, &mut terminal).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_loop(app: &App, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> anyhow::Result<()> {
    let (re_render_tx, mut re_render_rx) = mpsc::unbounded_channel();
    for name in EventName::ALL {
        let tx = re_render_tx.clone();
        app.context().events().on(name, move |_| {
            let _ = tx.send(());
            Ok(())
        });
    }

    // Initial render
    let _ = re_render_tx.send(());

    loop {
        tokio::select! {
            Some(()) = re_render_rx.recv() => {
                let view = View::capture(app);
                terminal.draw(|frame| draw(frame, &view))?;
            }
            event_ready = async { event::poll(Duration::from_millis(100)) } => {
                if !matches!(event_ready, Ok(true)) {
                    // Idle tick; picks up text changed by background tasks.
                    let _ = re_render_tx.send(());
                    continue;
                }
                match event::read()? {
                    CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                        let targets = nav_targets(app.router());
                        match key_action(key.code, &targets) {
                            Some(KeyAction::Quit) => return Ok(()),
                            Some(KeyAction::Navigate(path)) => {
                                if let Err(error) = app.router().navigate(&path, None).await {
                                    tracing::warn!(%error, "navigation failed");
                                }
                            }
                            Some(KeyAction::Back) => {
                                app.router().back().await;
                            }
                            Some(KeyAction::Forward) => {
                                app.router().forward().await;
                            }
                            Some(KeyAction::ToggleTheme) => {
                                let mut preferences = app.preferences();
                                preferences.theme = preferences.theme.toggled();
                                app.set_preferences(&preferences);
                            }
                            None => {}
                        }
                        let _ = re_render_tx.send(());
                    }
                    CrosstermEvent::Resize(..) => {
                        let _ = re_render_tx.send(());
                    }
                    _ => {}
                }
            }
        }
    }
}
