use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Terminal,
};

use crate::report::Latest;
use crate::session::{Report, Telemetry};
use crate::state::LinkState;

const MAX_LOG_LINES: usize = 500;
/// Packet rates are recomputed this often; frames in between reuse the cached value.
const RATE_REFRESH: Duration = Duration::from_secs(1);
const POLL_STEPS: [i32; 7] = [0, 1, 2, 5, 10, 20, 50];

pub(crate) fn next_poll_step(current: i32, up: bool) -> i32 {
    if up {
        POLL_STEPS.iter().copied().find(|s| *s > current).unwrap_or(current)
    } else {
        POLL_STEPS.iter().rev().copied().find(|s| *s < current).unwrap_or(current)
    }
}

fn state_color(state: LinkState) -> Color {
    match state {
        LinkState::Connected => Color::Green,
        s if s.is_active() => Color::Yellow,
        LinkState::ConnectionFailed | LinkState::ConnectionLost => Color::Red,
        _ => Color::Gray,
    }
}

pub fn run_tui(telemetry: Arc<Telemetry>, events: Receiver<String>, stop: Arc<AtomicBool>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut logs: Vec<String> = Vec::new();
    let mut log_scroll: usize = 0;
    let mut bytes_in = Latest::new(telemetry.bytes_in.subscribe());
    let mut bytes_out = Latest::new(telemetry.bytes_out.subscribe());
    let mut last_rate_refresh = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        while let Ok(ev) = events.try_recv() {
            logs.push(ev);
            if logs.len() > MAX_LOG_LINES {
                logs.remove(0);
            }
        }

        let refresh = last_rate_refresh.elapsed() >= RATE_REFRESH;
        if refresh {
            last_rate_refresh = Instant::now();
        }
        let report: Report = telemetry.report(bytes_in.get(), bytes_out.get(), !refresh);
        let polling = if telemetry.bytes_in.is_running() {
            format!("{} Hz", telemetry.poll_hz())
        } else {
            "off".to_string()
        };

        terminal.draw(|f| {
            let outer = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3), // Link state
                    Constraint::Length(4), // Rates
                    Constraint::Length(3), // Quality
                    Constraint::Length(3), // Battery
                    Constraint::Min(0),    // Console / events
                    Constraint::Length(1), // Footer
                ].as_ref())
                .split(f.size());

            let state = Paragraph::new(report.state.to_string())
                .style(Style::default().fg(state_color(report.state)))
                .block(Block::default().title("Link").borders(Borders::ALL));
            f.render_widget(state, outer[0]);

            let rates = Paragraph::new(format!(
                "Packets in: {:.1}/s   out: {:.1}/s\nBytes   in: {} B/s   out: {} B/s   (poll {polling})",
                report.packets_in_hz, report.packets_out_hz, report.bytes_in_per_sec, report.bytes_out_per_sec,
            ))
            .block(Block::default().title("Traffic").borders(Borders::ALL));
            f.render_widget(rates, outer[1]);

            let quality = report.link_quality.unwrap_or(0);
            let quality_gauge = Gauge::default()
                .block(Block::default().title("Link quality").borders(Borders::ALL))
                .gauge_style(Style::default().fg(Color::Cyan))
                .percent(quality as u16)
                .label(match report.link_quality {
                    Some(q) => format!("{q}%"),
                    None => "-".to_string(),
                });
            f.render_widget(quality_gauge, outer[2]);

            let (battery_pct, battery_label) = match report.battery {
                Some(b) => (b.percent, format!("{:.0}% ({} mV, {:?})", b.percent, b.millivolts, b.state)),
                None => (0.0, "-".to_string()),
            };
            let battery = Gauge::default()
                .block(Block::default().title("Battery").borders(Borders::ALL))
                .gauge_style(Style::default().fg(Color::Green))
                .ratio((battery_pct / 100.0).clamp(0.0, 1.0))
                .label(battery_label);
            f.render_widget(battery, outer[3]);

            let viewport = outer[4].height.saturating_sub(2) as usize;
            let start = logs.len().saturating_sub(viewport + log_scroll);
            let log_items: Vec<ListItem> = logs.iter().skip(start).map(|l| ListItem::new(l.clone())).collect();
            let log_list = List::new(log_items).block(Block::default().title("Console").borders(Borders::ALL));
            f.render_widget(log_list, outer[4]);

            let footer = Paragraph::new("q: quit | +/-: poll rate | space: start/stop polling | ↑/↓/Home: scroll | c: clear");
            f.render_widget(footer, outer[5]);
        })?;

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q')
                    || (key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL))
                {
                    stop.store(true, Ordering::Relaxed);
                } else {
                    match key.code {
                        KeyCode::Char('+') => telemetry.set_poll_hz(next_poll_step(telemetry.poll_hz(), true)),
                        KeyCode::Char('-') => telemetry.set_poll_hz(next_poll_step(telemetry.poll_hz(), false)),
                        KeyCode::Char(' ') => {
                            telemetry.toggle_polling();
                        }
                        KeyCode::Up => log_scroll = log_scroll.saturating_add(1),
                        KeyCode::Down => log_scroll = log_scroll.saturating_sub(1),
                        KeyCode::Home => log_scroll = 0,
                        KeyCode::Char('c') => {
                            logs.clear();
                            log_scroll = 0;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
