//! Inspector application state and event loop

use crate::snapshot::{SnapshotManager, Transcript};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Source,
    Stack,
    Heap,
    Terminal,
}

impl FocusedPane {
    /// Move focus to the next pane (clockwise: source -> terminal -> stack -> heap)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Source => FocusedPane::Terminal,
            FocusedPane::Terminal => FocusedPane::Stack,
            FocusedPane::Stack => FocusedPane::Heap,
            FocusedPane::Heap => FocusedPane::Source,
        }
    }
}

/// The inspector state
pub struct App {
    pub snapshots: SnapshotManager,
    pub transcript: Transcript,
    pub source_code: String,
    /// Capacity of the inspected address space, shown in the memory pane
    pub memory_capacity: usize,

    /// Index of the snapshot on screen
    pub position: usize,
    pub focused_pane: FocusedPane,

    pub source_scroll: super::panes::SourceScrollState,
    pub stack_scroll: usize,
    pub heap_scroll: usize,
    pub terminal_scroll: usize,

    pub should_quit: bool,
    pub status_message: String,
}

impl App {
    pub fn new(
        snapshots: SnapshotManager,
        transcript: Transcript,
        source_code: String,
        memory_capacity: usize,
    ) -> Self {
        let status_message = if snapshots.is_empty() {
            String::from("Nothing was executed")
        } else {
            String::from("Ready!")
        };
        App {
            snapshots,
            transcript,
            source_code,
            memory_capacity,
            position: 0,
            focused_pane: FocusedPane::Source,
            source_scroll: super::panes::SourceScrollState {
                offset: 0,
                target_line_row: None,
            },
            stack_scroll: 0,
            heap_scroll: 0,
            terminal_scroll: 0,
            should_quit: false,
            status_message,
        }
    }

    /// Run the inspector until the user quits
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    fn render(&mut self, frame: &mut Frame) {
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(frame.area());

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(main_chunks[0]);

        // Left column: Source (top) | Output (bottom)
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(columns[0]);

        // Right column: Call stack (top) | Memory (bottom)
        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(columns[1]);

        let Some(snapshot) = self.snapshots.get(self.position) else {
            super::panes::render_source_pane(
                frame,
                left_rows[0],
                &self.source_code,
                0,
                false,
                self.focused_pane == FocusedPane::Source,
                &mut self.source_scroll,
            );
            super::panes::render_status_bar(
                frame,
                main_chunks[1],
                &self.status_message,
                0,
                0,
                false,
            );
            return;
        };

        super::panes::render_source_pane(
            frame,
            left_rows[0],
            &self.source_code,
            snapshot.line as usize,
            snapshot.error.is_some(),
            self.focused_pane == FocusedPane::Source,
            &mut self.source_scroll,
        );
        super::panes::render_terminal_pane(
            frame,
            left_rows[1],
            &self.transcript,
            snapshot.output_lines,
            self.focused_pane == FocusedPane::Terminal,
            &mut self.terminal_scroll,
        );
        super::panes::render_stack_pane(
            frame,
            right_rows[0],
            snapshot,
            self.focused_pane == FocusedPane::Stack,
            &mut self.stack_scroll,
        );
        super::panes::render_heap_pane(
            frame,
            right_rows[1],
            snapshot,
            self.memory_capacity,
            self.focused_pane == FocusedPane::Heap,
            &mut self.heap_scroll,
        );

        let message = snapshot.error.as_deref().unwrap_or(&self.status_message);
        super::panes::render_status_bar(
            frame,
            main_chunks[1],
            message,
            self.position,
            self.snapshots.len(),
            snapshot.error.is_some(),
        );
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::Left => self.step_backward(),
            KeyCode::Right => self.step_forward(),
            KeyCode::Up => match self.focused_pane {
                FocusedPane::Source => {
                    // Scrolling up makes the current line move down visually
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_add(1));
                    }
                }
                FocusedPane::Stack => self.stack_scroll = self.stack_scroll.saturating_sub(1),
                FocusedPane::Heap => self.heap_scroll = self.heap_scroll.saturating_sub(1),
                FocusedPane::Terminal => {
                    self.terminal_scroll = self.terminal_scroll.saturating_sub(1)
                }
            },
            KeyCode::Down => match self.focused_pane {
                FocusedPane::Source => {
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_sub(1));
                    }
                }
                FocusedPane::Stack => self.stack_scroll = self.stack_scroll.saturating_add(1),
                FocusedPane::Heap => self.heap_scroll = self.heap_scroll.saturating_add(1),
                FocusedPane::Terminal => {
                    self.terminal_scroll = self.terminal_scroll.saturating_add(1)
                }
            },
            KeyCode::Enter => {
                self.position = self.snapshots.len().saturating_sub(1);
                self.status_message = "Jumped to end".to_string();
                self.terminal_scroll = usize::MAX;
            }
            KeyCode::Backspace => {
                self.position = 0;
                self.status_message = "Jumped to start".to_string();
                self.terminal_scroll = usize::MAX;
            }
            _ => {}
        }
    }

    fn step_forward(&mut self) {
        if self.position + 1 < self.snapshots.len() {
            self.position += 1;
            self.status_message = "Stepped forward".to_string();
            // Auto-scroll output to bottom
            self.terminal_scroll = usize::MAX;
        } else {
            self.status_message = "Cannot step forward: at the last line".to_string();
        }
    }

    fn step_backward(&mut self) {
        if self.position > 0 {
            self.position -= 1;
            self.status_message = "Stepped backward".to_string();
            self.terminal_scroll = usize::MAX;
        } else {
            self.status_message = "Cannot step backward: at the first line".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use crate::vm::settings::Settings;
    use crate::vm::trace::Host;
    use crossterm::event::KeyModifiers;
    use ratatui::backend::TestBackend;

    fn inspected(source: &str) -> App {
        let mut host = Host::new(Settings::default());
        let mut snapshots = SnapshotManager::new(1 << 20);
        host.run(source, |host, line, error| {
            let snapshot = Snapshot::capture(
                host.memory(),
                host.output(),
                line,
                error.map(|e| e.to_string()),
            );
            snapshots.push(snapshot).unwrap();
        });
        let capacity = host.memory().heap().capacity();
        App::new(snapshots, host.output().clone(), source.to_string(), capacity)
    }

    fn screen(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key_event(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_renders_panes_for_each_step() {
        let mut app = inspected("push 7\nlet x\nframe f 0x20\npush \"hi\"\nprint\n");
        let first = screen(&mut app);
        assert!(first.contains("Call Stack"));
        assert!(first.contains("Step 1/5"));
        assert!(first.contains("(no output)"));

        press(&mut app, KeyCode::Enter);
        let last = screen(&mut app);
        assert!(last.contains("Step 5/5"));
        assert!(last.contains("<fn f>"));
        assert!(last.contains("x -> 0x0001 = 7"));
        assert!(last.contains("hi"));
    }

    #[test]
    fn test_stepping_stays_in_bounds() {
        let mut app = inspected("push 1\npop\n");
        press(&mut app, KeyCode::Left);
        assert_eq!(app.position, 0);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Right);
        assert_eq!(app.position, 1);
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.position, 0);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focused_pane, FocusedPane::Terminal);
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[test]
    fn test_error_line_is_reported_in_status() {
        let mut app = inspected("get nope\n");
        let text = screen(&mut app);
        assert!(text.contains("Identifier 'nope' is not defined"));
    }
}
