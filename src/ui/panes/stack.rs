//! Call stack pane
//!
//! Entries are listed innermost first, the way the error reports print them.
//! Each binding shows the value its cell holds in the snapshot; bindings
//! copied in from a closure are tinted. The argument and memory-register
//! stacks follow, top first.

use super::{pane_block, render_scrolled_list};
use crate::memory::stack::{EntryKind, FrameKind};
use crate::memory::value::Value;
use crate::snapshot::Snapshot;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::ListItem,
    Frame,
};

fn value_style(value: &Value) -> Style {
    match value {
        Value::Number(_) => Style::default().fg(DEFAULT_THEME.number),
        Value::String(_) => Style::default().fg(DEFAULT_THEME.string),
        Value::Reference(_) | Value::ListHeader { .. } => {
            Style::default().fg(DEFAULT_THEME.type_name)
        }
        Value::Closure(_) => Style::default().fg(DEFAULT_THEME.closure),
        Value::None => Style::default().fg(DEFAULT_THEME.comment),
    }
}

fn section_header(title: String) -> ListItem<'static> {
    ListItem::new(Line::from(Span::styled(
        title,
        Style::default()
            .fg(DEFAULT_THEME.secondary)
            .add_modifier(Modifier::BOLD),
    )))
}

/// Build the pane's rows without rendering them
pub(crate) fn stack_items(snapshot: &Snapshot) -> Vec<ListItem<'static>> {
    let mut items = Vec::new();
    let addr_style = Style::default().fg(DEFAULT_THEME.comment);

    for (pos, entry) in snapshot.stack.iter().enumerate().rev() {
        let position = Span::styled(format!("[0x{:04X}] ", pos), addr_style);
        let line = match entry.kind {
            EntryKind::Frame { kind, .. } => {
                let (label, ret) = match kind {
                    FrameKind::Function { return_address } => ("fn", return_address),
                    FrameKind::Auto { return_address } => ("auto", return_address),
                };
                Line::from(vec![
                    position,
                    Span::styled("▸ ", Style::default().fg(DEFAULT_THEME.secondary)),
                    Span::styled(
                        format!("<{} {}>", label, entry.id),
                        Style::default()
                            .fg(DEFAULT_THEME.function)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(format!(" ret 0x{:X}", ret), addr_style),
                ])
            }
            EntryKind::Binding(addr) => {
                let name_style = if entry.is_closure {
                    Style::default().fg(DEFAULT_THEME.closure)
                } else {
                    Style::default().fg(DEFAULT_THEME.fg)
                };
                let mut spans = vec![
                    position,
                    Span::raw("  "),
                    Span::styled(entry.id.to_string(), name_style),
                    Span::styled(format!(" -> {}", addr), addr_style),
                ];
                if let Some(value) = snapshot.cells.get(addr.index()) {
                    spans.push(Span::raw(" = "));
                    spans.push(Span::styled(value.to_string(), value_style(value)));
                }
                Line::from(spans)
            }
        };
        items.push(ListItem::new(line));
    }

    items.push(section_header(format!("Arguments ({})", snapshot.args.len())));
    if snapshot.args.is_empty() {
        items.push(ListItem::new("  (empty)").style(addr_style));
    }
    for value in snapshot.args.iter().rev() {
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(value.to_string(), value_style(value)),
        ])));
    }

    items.push(section_header(format!(
        "Registers ({})",
        snapshot.registers.len()
    )));
    for addr in snapshot.registers.iter().rev() {
        items.push(ListItem::new(format!("  {}", addr)).style(addr_style));
    }
    items
}

/// Render the call stack pane
pub fn render_stack_pane(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let title = format!(
        " Call Stack (FP {} SP {}) ",
        snapshot.pointers.frame_pointer, snapshot.pointers.stack_pointer
    );
    let block = pane_block(&title, is_focused);
    render_scrolled_list(frame, area, block, stack_items(snapshot), scroll_offset);
}
