use std::{
    collections::HashSet,
    io::{self, Stdout},
    time::Duration,
};

use anyhow::Result;
use cave_agent_core::{
    Location,
    agent::Decision,
    session::{SessionObserver, SessionState, TickReport},
    snapshot::{Occupancy, WorldView},
};
use ratatui::{
    crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use tracing::warn;

/// Renders the cave, its occupants, the target and the planned path.
pub fn map_lines(view: &WorldView, decision: &Decision) -> Vec<Line<'static>> {
    let path: HashSet<Location> = decision.path.cells.iter().copied().collect();
    let columns = view.cave.columns();

    let mut lines = Vec::with_capacity(view.cave.rows());
    let mut spans = Vec::with_capacity(columns);
    for (location, cell) in view.occupancy_grid().enumerate() {
        spans.push(cell_span(
            view.cave.is_rock(location),
            cell,
            decision.target == Some(location),
            path.contains(&location),
        ));
        if location.column + 1 == columns {
            lines.push(Line::from(std::mem::take(&mut spans)));
        }
    }
    lines
}

fn cell_span(rock: bool, cell: &Occupancy, target: bool, on_path: bool) -> Span<'static> {
    if cell.me {
        Span::styled("@", Style::default().fg(Color::Red).bold())
    } else if cell.dragon {
        Span::styled("D", Style::default().fg(Color::LightRed))
    } else if cell.other_player {
        Span::styled("P", Style::default().fg(Color::Magenta))
    } else if target {
        Span::styled("*", Style::default().fg(Color::Cyan).bold())
    } else if cell.gold {
        Span::styled("G", Style::default().fg(Color::Yellow))
    } else if cell.health {
        Span::styled("H", Style::default().fg(Color::Green))
    } else if on_path {
        Span::styled("·", Style::default().fg(Color::Blue))
    } else if rock {
        Span::styled("#", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw(" ")
    }
}

/// Plain-text form of a rendered line.
pub fn plain(line: &Line) -> String {
    line.spans.iter().map(|span| span.content.as_ref()).collect()
}

/// Human-readable summary of one decision.
pub fn describe(decision: &Decision) -> String {
    let target = decision
        .target
        .map(|at| format!("({}, {})", at.row, at.column))
        .unwrap_or_else(|| "none".to_string());
    let command = decision
        .command
        .map(|direction| format!("{direction:?}"))
        .unwrap_or_else(|| "none".to_string());
    format!(
        "{:?}: target {target}, command {command}, path {} steps (cost {})",
        decision.kind,
        decision.path.steps.len(),
        decision.path.cost
    )
}

/// Live terminal view of a running session.
///
/// Redrawn after every tick. `q` or `Esc` asks the session to stop; the key
/// is only noticed once the next message arrives.
pub struct TerminalView {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    quit: bool,
}

impl TerminalView {
    pub fn new() -> Result<Self> {
        Ok(TerminalView {
            terminal: setup_terminal()?,
            quit: false,
        })
    }

    fn draw(&mut self, state: &SessionState, report: &TickReport) -> Result<()> {
        let (Some(cave), Some(snapshot), Some(me)) = (state.cave(), state.snapshot(), state.me())
        else {
            return Ok(());
        };
        let world = WorldView::new(cave, snapshot, me)?;
        let lines = map_lines(&world, &report.decision);

        self.terminal.draw(|frame| {
            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Percentage(70), // Area for the map
                    Constraint::Percentage(20), // Area for the decision
                    Constraint::Percentage(10), // Area for status/help
                ])
                .split(frame.area());

            let map = Paragraph::new(lines)
                .block(Block::default().title("Cave").borders(Borders::ALL))
                .alignment(Alignment::Center);
            frame.render_widget(map, layout[0]);

            let status = List::new([
                ListItem::from(format!(
                    "Tick: {}  Phase: {:?}  Location: ({}, {})",
                    report.tick,
                    state.phase(),
                    report.location.row,
                    report.location.column
                )),
                ListItem::from(describe(&report.decision)),
            ])
            .block(Block::default().borders(Borders::ALL).title("Decision"));
            frame.render_widget(status, layout[1]);

            let help = Paragraph::new("Press 'q' or 'Esc' to stop after the next message.")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::TOP));
            frame.render_widget(help, layout[2]);
        })?;
        Ok(())
    }

    fn poll_quit(&mut self) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    self.quit = true;
                }
            }
        }
        Ok(())
    }
}

impl SessionObserver for TerminalView {
    fn on_tick(&mut self, state: &SessionState, report: &TickReport) {
        if let Err(err) = self.draw(state, report) {
            warn!(%err, "failed to draw the cave");
        }
    }

    fn should_stop(&mut self) -> bool {
        if let Err(err) = self.poll_quit() {
            warn!(%err, "failed to read terminal events");
        }
        self.quit
    }
}

impl Drop for TerminalView {
    fn drop(&mut self) {
        if let Err(err) = restore_terminal(&mut self.terminal) {
            warn!(%err, "failed to restore the terminal");
        }
    }
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
