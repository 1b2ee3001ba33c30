//! Output pane rendering

use super::{pane_block, render_scrolled_list};
use crate::snapshot::Transcript;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::Style,
    widgets::{ListItem, Padding, Paragraph},
    Frame,
};

/// Render the output written up to and including the current snapshot
pub fn render_terminal_pane(
    frame: &mut Frame,
    area: Rect,
    transcript: &Transcript,
    visible_lines: usize,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let block = pane_block(" Output ", is_focused);

    if visible_lines == 0 {
        let paragraph = Paragraph::new("(no output)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let block = block.padding(Padding::new(1, 0, 0, 0));
    let items: Vec<ListItem> = transcript
        .lines
        .iter()
        .take(visible_lines)
        .flat_map(|tl| tl.text.split('\n'))
        .map(|text| ListItem::new(text.to_string()).style(Style::default().fg(DEFAULT_THEME.fg)))
        .collect();
    render_scrolled_list(frame, area, block, items, scroll_offset);
}
