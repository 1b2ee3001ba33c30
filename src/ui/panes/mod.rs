//! TUI pane rendering modules
//!
//! # Pane Modules
//!
//! - [`source`]: Trace source with the current line highlighted
//! - [`stack`]: Call stack, innermost entry first, with the operand stacks below
//! - [`heap`]: Live cells grouped by allocation, then the free list
//! - [`terminal`]: Output written by `print` and the natives
//! - [`status`]: Status bar with keybindings and the current step
//!
//! Each pane module exports a `render_*` function taking the snapshot data it
//! shows, whether it has focus, and its scroll state.

pub mod heap;
pub mod source;
pub mod stack;
pub mod status;
pub mod terminal;

pub use heap::render_heap_pane;
pub use source::{render_source_pane, SourceScrollState};
pub use stack::render_stack_pane;
pub use status::render_status_bar;
pub use terminal::render_terminal_pane;

use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

pub(crate) fn pane_block(title: &str, is_focused: bool) -> Block<'_> {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style)
}

/// Render `items` as a list scrolled by `scroll_offset`, clamping the offset
/// so the last item never scrolls above the bottom border.
pub(crate) fn render_scrolled_list(
    frame: &mut Frame,
    area: Rect,
    block: Block,
    items: Vec<ListItem>,
    scroll_offset: &mut usize,
) {
    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    let total_items = items.len();
    if total_items > visible_height {
        *scroll_offset = (*scroll_offset).min(total_items - visible_height);
    } else {
        *scroll_offset = 0;
    }

    let visible: Vec<ListItem> = items
        .into_iter()
        .skip(*scroll_offset)
        .take(visible_height)
        .collect();
    frame.render_widget(List::new(visible).block(block), area);
}
