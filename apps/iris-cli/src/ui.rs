use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use iris_session::{SessionUpdate, UiCommand};
use iris_types::session::{ControlsView, SessionState, UiProjection};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
    Terminal,
};
use tokio::sync::mpsc::Sender;

const MAX_LOG_ENTRIES: usize = 120;

pub fn run(
    receiver: Receiver<SessionUpdate>,
    commands: Sender<UiCommand>,
    summary: String,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, commands, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<SessionUpdate>,
    commands: Sender<UiCommand>,
    summary: &str,
) -> Result<()> {
    let mut projection = UiProjection::new(SessionState::Idle, "Connecting...");
    let mut name_input = String::new();
    let mut alert: Option<String> = None;
    let mut logs: VecDeque<String> = VecDeque::with_capacity(MAX_LOG_ENTRIES);

    loop {
        let mut receiver_closed = false;
        loop {
            match receiver.try_recv() {
                Ok(SessionUpdate::Projection(next)) => {
                    push_status(&mut logs, &next.status);
                    projection = next;
                }
                Ok(SessionUpdate::Alert(text)) => {
                    alert = Some(text);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    receiver_closed = true;
                    break;
                }
            }
        }
        if receiver_closed {
            break;
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints(
                    [
                        Constraint::Length(3),
                        Constraint::Length(3),
                        Constraint::Min(0),
                    ]
                    .as_ref(),
                )
                .split(f.size());

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "Iris Capture",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(projection.status.clone()),
                Span::raw("  "),
                Span::styled("config:", Style::default().fg(Color::Magenta)),
                Span::raw(" "),
                Span::raw(summary),
            ]))
            .block(Block::default().borders(Borders::ALL).title("status"));
            f.render_widget(header, chunks[0]);

            let controls = match projection.view {
                ControlsView::PreSession => Paragraph::new(format!("Name: {name_input}_")).block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("[Enter] start  [Esc] quit"),
                ),
                ControlsView::InSession => Paragraph::new("[s] save   [d] discard").block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("session in progress"),
                ),
            };
            f.render_widget(controls, chunks[1]);

            let items: Vec<ListItem> = logs
                .iter()
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect();
            let list =
                List::new(items).block(Block::default().borders(Borders::ALL).title("recent"));
            f.render_widget(list, chunks[2]);

            if let Some(text) = &alert {
                let area = centered_rect(f.size(), 40, 5);
                let popup = Paragraph::new(format!("{text}\n\npress any key"))
                    .style(Style::default().fg(Color::Red))
                    .block(Block::default().borders(Borders::ALL).title("alert"));
                f.render_widget(Clear, area);
                f.render_widget(popup, area);
            }
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if alert.is_some() {
                    alert = None;
                    continue;
                }
                match projection.view {
                    ControlsView::PreSession => match key.code {
                        KeyCode::Esc => {
                            let _ = commands.blocking_send(UiCommand::Quit);
                            break;
                        }
                        KeyCode::Enter => {
                            let _ = commands.blocking_send(UiCommand::Start(name_input.clone()));
                        }
                        KeyCode::Backspace => {
                            name_input.pop();
                        }
                        KeyCode::Char(c) => name_input.push(c),
                        _ => {}
                    },
                    ControlsView::InSession => match key.code {
                        KeyCode::Char('s') => {
                            let _ = commands.blocking_send(UiCommand::Save);
                        }
                        KeyCode::Char('d') => {
                            let _ = commands.blocking_send(UiCommand::Discard);
                        }
                        KeyCode::Char('q') | KeyCode::Esc => {
                            let _ = commands.blocking_send(UiCommand::Quit);
                            break;
                        }
                        _ => {}
                    },
                }
            }
        }
    }

    Ok(())
}

/// Append a status line, skipping consecutive duplicates.
fn push_status(logs: &mut VecDeque<String>, status: &str) {
    if logs.back().map(String::as_str) == Some(status) {
        return;
    }
    if logs.len() == MAX_LOG_ENTRIES {
        logs.pop_front();
    }
    logs.push_back(status.to_string());
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_log_skips_consecutive_duplicates() {
        let mut logs = VecDeque::new();
        push_status(&mut logs, "Connected. Ready to start.");
        push_status(&mut logs, "Connected. Ready to start.");
        push_status(&mut logs, "Recording started. Move your head around.");
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn status_log_is_bounded() {
        let mut logs = VecDeque::new();
        for i in 0..(MAX_LOG_ENTRIES + 10) {
            push_status(&mut logs, &format!("status {i}"));
        }
        assert_eq!(logs.len(), MAX_LOG_ENTRIES);
    }

    #[test]
    fn popup_rect_is_clamped_to_area() {
        let area = Rect::new(0, 0, 20, 4);
        let rect = centered_rect(area, 40, 5);
        assert!(rect.width <= area.width);
        assert!(rect.height <= area.height);
    }
}
