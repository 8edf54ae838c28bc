pub mod charting;
pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Paragraph, Widget, Wrap},
    Frame,
};
use reflex::{util::format_countdown, Clock, InputVerdict, Verdict};

use crate::{ui::screen::Screen, App};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
const STIMULUS_WIDTH: u16 = 24;
const STIMULUS_HEIGHT: u16 = 8;

pub fn ui<C: Clock>(app: &App<C>, f: &mut Frame) {
    Screen::for_state(app.state).render(app, f);
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().patch(bold()).add_modifier(Modifier::DIM)
}

fn italic() -> Style {
    Style::default().add_modifier(Modifier::ITALIC)
}

/// Rect of at most `width` x `height` centred in `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect::new(
        area.x + (area.width - w) / 2,
        area.y + (area.height - h) / 2,
        w,
        h,
    )
}

fn lines(text: Vec<Line<'_>>, area: Rect, buf: &mut Buffer) {
    Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(area, buf);
}

pub fn render_ready<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let t = &app.settings.test;
    let subject = match app.settings.age {
        Some(age) => format!("age {} | {}", age, app.settings.sex),
        None => "no age given, biological age will be skipped".to_string(),
    };
    let text = vec![
        Line::from(Span::styled("reaction time test", bold().fg(Color::Cyan))),
        Line::from(""),
        Line::from(Span::styled(
            format!(
                "{} rounds x {} stimuli | visible {}ms | wait {}-{}ms",
                t.round_count, t.stimuli_per_round, t.exposure_duration_ms, t.min_delay_ms, t.max_delay_ms
            ),
            dim(),
        )),
        Line::from(Span::styled(subject, dim())),
        Line::from(""),
        Line::from("press space as soon as the red block appears"),
        Line::from(""),
        Line::from(Span::styled("(space) start / (esc)ape", italic())),
    ];
    lines(text, centered(area, area.width, 9), buf);
}

pub fn render_testing<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // counters
            Constraint::Min(STIMULUS_HEIGHT),
            Constraint::Length(1), // feedback
            Constraint::Length(1), // legend
        ])
        .split(area);

    let engine = &app.engine;
    let per_round = engine.config().stimuli_per_round;
    let (index, total) = app
        .stimulus
        .unwrap_or(((engine.stimulus_index() + 1).min(per_round), per_round));
    Paragraph::new(Span::styled(
        format!(
            "round {}/{}   stimulus {}/{}",
            engine.current_round(),
            engine.config().round_count,
            index,
            total
        ),
        dim(),
    ))
    .alignment(Alignment::Center)
    .render(chunks[0], buf);

    if app.stimulus.is_some() {
        Block::default()
            .borders(Borders::ALL)
            .style(Style::default().bg(Color::Red).fg(Color::Red))
            .render(centered(chunks[1], STIMULUS_WIDTH, STIMULUS_HEIGHT), buf);
    }

    let feedback = match app.last_verdict {
        Some(InputVerdict::Accepted(ms)) => Span::styled(format!("{ms} ms"), bold().fg(Color::Green)),
        Some(InputVerdict::TooFast(_)) => Span::styled("too fast, not counted", bold().fg(Color::Yellow)),
        Some(InputVerdict::Duplicate) => Span::styled("already counted", dim()),
        Some(InputVerdict::NotVisible) => {
            Span::styled("too early, wait for the block", bold().fg(Color::Yellow))
        }
        Some(InputVerdict::Abuse) | None => Span::raw(""),
    };
    Paragraph::new(feedback)
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    Paragraph::new(Span::styled("(space) react / (r)estart round / (esc)ape", italic()))
        .render(chunks[3], buf);
}

pub fn render_rest<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let remaining = app.rest_secs_remaining().unwrap_or(0);
    let round = app
        .last_summary
        .as_ref()
        .map(|s| {
            format!(
                "round {} average {} ms ({} of {} hit)",
                s.round,
                s.average_ms,
                s.valid_count,
                s.valid_count + s.misses
            )
        })
        .unwrap_or_default();
    let spread = app
        .last_summary
        .as_ref()
        .and_then(|s| Some((s.fastest_ms()?, s.slowest_ms()?)))
        .map(|(fast, slow)| format!("fastest {fast} ms, slowest {slow} ms"))
        .unwrap_or_else(|| "no valid reactions this round".to_string());
    let text = vec![
        Line::from(Span::styled("rest", bold().fg(Color::Cyan))),
        Line::from(Span::styled(format_countdown(remaining), bold())),
        Line::from(""),
        Line::from(Span::styled(round, dim())),
        Line::from(Span::styled(spread, dim())),
        Line::from(""),
        Line::from(Span::styled("(space) continue now / (esc)ape", italic())),
    ];
    lines(text, centered(area, area.width, 7), buf);
}

pub fn render_paused<C: Clock>(_app: &App<C>, area: Rect, buf: &mut Buffer) {
    let text = vec![
        Line::from(Span::styled(
            "too many presses, round paused",
            bold().fg(Color::Red),
        )),
        Line::from(""),
        Line::from("press once per block"),
        Line::from(""),
        Line::from(Span::styled(
            "(c) resume / (r)estart round / (esc)ape",
            italic(),
        )),
    ];
    lines(text, centered(area, area.width, 5), buf);
}

pub fn render_results<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Min(5),    // chart
            Constraint::Length(1), // grand average
            Constraint::Length(1), // normative estimate
            Constraint::Length(1), // status
            Constraint::Length(1), // padding
            Constraint::Length(1), // legend
        ])
        .split(area);

    let Some(result) = &app.final_result else {
        lines(vec![Line::from("no completed rounds")], chunks[0], buf);
        return;
    };

    let bars = charting::round_bars(&result.rounds);
    let data: Vec<(&str, u64)> = bars.iter().map(|(l, v)| (l.as_str(), *v)).collect();
    BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("round averages (ms)"),
        )
        .data(data.as_slice())
        .max(charting::bar_ceiling(&bars))
        .bar_width(6)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Magenta))
        .value_style(bold().bg(Color::Magenta))
        .render(chunks[0], buf);

    Paragraph::new(Span::styled(
        format!("grand average {} ms", result.grand_average_ms),
        bold(),
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let estimate = match app.normative {
        Some(n) => {
            let color = match n.verdict {
                Verdict::Accelerated => Color::Green,
                Verdict::Normal => Color::Cyan,
                Verdict::Delayed => Color::Yellow,
            };
            Span::styled(
                format!(
                    "biological age {:.2} for age {}   tempo {:.2}   {}",
                    n.biological_age, n.chronological_age, n.ratio, n.verdict
                ),
                bold().fg(color),
            )
        }
        None => Span::styled("no biological age estimate (pass --age)", dim()),
    };
    Paragraph::new(estimate)
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    if let Some(status) = &app.status {
        Paragraph::new(Span::styled(status.as_str(), italic().fg(Color::Cyan)))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
    }

    Paragraph::new(Span::styled("(s)ave / (n)ew / (esc)ape", italic())).render(chunks[5], buf);
}
