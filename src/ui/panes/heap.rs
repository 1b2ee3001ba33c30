//! Memory pane: live allocations cell by cell, then the free list

use super::{pane_block, render_scrolled_list};
use crate::snapshot::Snapshot;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::ListItem,
    Frame,
};

pub(crate) fn heap_items(snapshot: &Snapshot) -> Vec<ListItem<'static>> {
    let mut items = Vec::new();
    let addr_style = Style::default().fg(DEFAULT_THEME.comment);

    if snapshot.live_extents.is_empty() {
        items.push(ListItem::new("(no live cells)").style(addr_style));
    }
    for &(start, size) in &snapshot.live_extents {
        items.push(ListItem::new(Line::from(vec![
            Span::styled("▸ ", Style::default().fg(DEFAULT_THEME.secondary)),
            Span::styled(
                format!("{} ", start),
                Style::default()
                    .fg(DEFAULT_THEME.primary)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("{} cell(s)", size), addr_style),
        ])));
        for offset in 0..size {
            let addr = start.offset(offset);
            let Some(value) = snapshot.cells.get(addr.index()) else {
                break;
            };
            items.push(ListItem::new(Line::from(vec![
                Span::styled(format!("  {} ", addr), addr_style),
                Span::styled(
                    format!("[{}] ", value.type_name()),
                    Style::default().fg(DEFAULT_THEME.type_name),
                ),
                Span::styled(value.to_string(), Style::default().fg(DEFAULT_THEME.fg)),
            ])));
        }
    }

    items.push(ListItem::new(Line::from(Span::styled(
        format!("Free blocks ({})", snapshot.free_blocks.len()),
        Style::default()
            .fg(DEFAULT_THEME.secondary)
            .add_modifier(Modifier::BOLD),
    ))));
    for block in &snapshot.free_blocks {
        items.push(
            ListItem::new(format!(
                "  {} .. 0x{:04X} ({} cells)",
                block.start,
                block.end(),
                block.size
            ))
            .style(Style::default().fg(DEFAULT_THEME.free_block)),
        );
    }
    items
}

/// Render the memory pane
pub fn render_heap_pane(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    capacity: usize,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let title = format!(
        " Memory (MP {} / {}) ",
        snapshot.pointers.memory_pointer, capacity
    );
    let block = pane_block(&title, is_focused);
    render_scrolled_list(frame, area, block, heap_items(snapshot), scroll_offset);
}
