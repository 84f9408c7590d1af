use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::{App, InputMode};

/// Wrap one line of content into chunks of at most `width` chars. Simple
/// char-based wrapping so line counts match the scroll calculations exactly.
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    if width == 0 || line.is_empty() {
        return vec![line.to_string()];
    }
    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

pub fn draw(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::vertical([
        Constraint::Min(1),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .split(frame.area());

    draw_chat(frame, app, chunks[0]);
    draw_input(frame, app, chunks[1]);
    draw_status(frame, app, chunks[2]);
}

fn role_line(app: &App, role: &str) -> Line<'static> {
    if role == "user" {
        Line::from(Span::styled(
            "You",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))
    } else {
        Line::from(Span::styled(
            app.bot_name.clone(),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ))
    }
}

fn push_message(lines: &mut Vec<Line<'static>>, app: &App, role: &str, content: &str, width: usize) {
    lines.push(role_line(app, role));
    for content_line in content.lines() {
        for wrapped in wrap_line(content_line, width) {
            lines.push(Line::from(wrapped));
        }
    }
    lines.push(Line::from(""));
}

fn draw_chat(frame: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", app.bot_name));
    let inner = block.inner(area);

    // Cache dimensions for the scroll math
    app.chat_height = inner.height;
    app.chat_width = inner.width;

    let width = inner.width as usize;
    let mut lines: Vec<Line> = Vec::new();

    for msg in &app.messages {
        push_message(&mut lines, app, &msg.role, &msg.content, width);
    }

    // The in-flight exchange is not in the log yet; render it on top
    if let Some(pending) = &app.pending_user {
        push_message(&mut lines, app, "user", pending, width);
    }
    if app.is_busy() {
        lines.push(role_line(app, "assistant"));
        if app.partial_reply.is_empty() {
            let dots = ".".repeat(app.animation_frame as usize + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{dots}"),
                Style::default().fg(Color::DarkGray),
            )));
        } else {
            let mut reply_lines: Vec<String> = Vec::new();
            for content_line in app.partial_reply.lines() {
                reply_lines.extend(wrap_line(content_line, width));
            }
            if let Some(last) = reply_lines.last_mut() {
                last.push('▌');
            } else {
                reply_lines.push("▌".to_string());
            }
            for wrapped in reply_lines {
                lines.push(Line::from(wrapped));
            }
            lines.push(Line::from(""));
        }
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "No messages yet. Press i and say something.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let chat = Paragraph::new(lines)
        .block(block)
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, area);
}

fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.input_mode {
        InputMode::Normal => " Message (press i to type) ",
        InputMode::Editing => " Message (Enter to send, Esc to cancel) ",
    };
    let style = match app.input_mode {
        InputMode::Normal => Style::default(),
        InputMode::Editing => Style::default().fg(Color::Yellow),
    };

    let input = Paragraph::new(app.input.as_str())
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing {
        // Cursor position in chars; good enough for single-width glyphs
        let x = area.x + 1 + app.cursor.min(u16::MAX as usize) as u16;
        frame.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}

fn draw_status(frame: &mut Frame, app: &App, area: Rect) {
    let left = format!(" {} | {} ", app.bot_name, app.model);
    let right = match &app.status {
        Some(status) => status.clone(),
        None => "q quit | i type | c clear | j/k scroll".to_string(),
    };

    let status = Line::from(vec![
        Span::styled(left, Style::default().fg(Color::Black).bg(Color::Cyan)),
        Span::raw(" "),
        Span::styled(right, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(status), area);
}
