//! Source pane rendering with syntax highlighting
//!
//! Shows the trace being inspected with the line of the current snapshot
//! highlighted, or painted red when that line failed.

use crate::ui::theme::DEFAULT_THEME;
use crate::vm::trace::comment_start;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Highlight one trace line: command word, operands, comment
fn highlight_trace_line(line: &str) -> Line<'_> {
    let (code, comment) = line.split_at(comment_start(line).unwrap_or(line.len()));

    let mut spans = Vec::new();
    let mut first_word = true;
    for (i, word) in code.split(' ').enumerate() {
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        if word.is_empty() {
            continue;
        }
        let style = if first_word {
            first_word = false;
            Style::default()
                .fg(DEFAULT_THEME.keyword)
                .add_modifier(Modifier::BOLD)
        } else if word.starts_with('"') || word.ends_with('"') {
            Style::default().fg(DEFAULT_THEME.string)
        } else if word.starts_with('@') || word.starts_with("0x") {
            Style::default().fg(DEFAULT_THEME.type_name)
        } else if word.parse::<f64>().is_ok() || word == "none" {
            Style::default().fg(DEFAULT_THEME.number)
        } else {
            Style::default().fg(DEFAULT_THEME.fg)
        };
        spans.push(Span::styled(word, style));
    }
    if !comment.is_empty() {
        spans.push(Span::styled(
            comment,
            Style::default().fg(DEFAULT_THEME.comment),
        ));
    }
    Line::from(spans)
}

/// Scroll state for the source pane
pub struct SourceScrollState {
    pub offset: usize,
    pub target_line_row: Option<usize>,
}

/// Render the source pane
pub fn render_source_pane(
    frame: &mut Frame,
    area: Rect,
    source_code: &str,
    current_line: usize,
    is_error: bool,
    is_focused: bool,
    scroll_state: &mut SourceScrollState,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let block = Block::default()
        .title(" Trace ")
        .borders(Borders::ALL)
        .border_style(border_style);

    let lines: Vec<&str> = source_code.lines().collect();
    let total_lines = lines.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;

    // Keep the current line at a fixed row, centered at first
    let target_row = scroll_state
        .target_line_row
        .unwrap_or(visible_height / 2)
        .min(visible_height.saturating_sub(1));
    scroll_state.target_line_row = Some(target_row);

    if current_line > 0 && current_line <= total_lines {
        scroll_state.offset = (current_line - 1).saturating_sub(target_row);
        if total_lines > visible_height {
            scroll_state.offset = scroll_state.offset.min(total_lines - visible_height);
        } else {
            scroll_state.offset = 0;
        }
    }

    let visible_lines: Vec<Line> = lines
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(idx, line)| {
            let line_num = idx + 1;
            let is_current = line_num == current_line;
            let mut content = highlight_trace_line(line);

            let num_style = if is_current {
                Style::default()
                    .fg(if is_error {
                        DEFAULT_THEME.error
                    } else {
                        DEFAULT_THEME.secondary
                    })
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(DEFAULT_THEME.comment)
            };

            if is_current && is_error {
                let error_style = Style::default()
                    .bg(DEFAULT_THEME.error)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD);
                for span in &mut content.spans {
                    span.style = error_style;
                }
            } else if is_current {
                let bg = Style::default().bg(DEFAULT_THEME.current_line_bg);
                for span in &mut content.spans {
                    span.style = span.style.patch(bg);
                }
            }

            let mut spans = vec![Span::styled(format!("{:4} ", line_num), num_style)];
            spans.extend(content.spans);
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(visible_lines).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_splits_comment() {
        let line = highlight_trace_line("push \"a\" # note");
        let text: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text.first(), Some(&"push"));
        assert_eq!(text.last(), Some(&"# note"));
    }

    #[test]
    fn test_highlight_comment_inside_word() {
        let line = highlight_trace_line("push 1#x");
        let text: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, vec!["push", " ", "1", "#x"]);

        let line = highlight_trace_line("push \"a#b\"");
        assert!(line.spans.iter().all(|s| !s.content.starts_with('#')));
    }
}
