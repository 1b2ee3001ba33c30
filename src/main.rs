// Wendy: WendyScript VM memory subsystem driven by trace files

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use wendy::snapshot::{Snapshot, SnapshotManager};
use wendy::ui::App;
use wendy::vm::errors::VmError;
use wendy::vm::report::{self, Painter, SourceText};
use wendy::vm::settings::{Limits, Settings};
use wendy::vm::trace::Host;

#[derive(Parser)]
#[command(name = "wendy")]
#[command(about = "Run WendyScript memory traces")]
struct Cli {
    /// Trace file; reads commands interactively from stdin when omitted
    file: Option<PathBuf>,

    /// Dump limits, pointers and free blocks with every error
    #[arg(long)]
    verbose: bool,

    /// Stop at the first error
    #[arg(long)]
    strict: bool,

    /// Never collect; allocations fail as soon as memory is exhausted
    #[arg(long)]
    no_gc: bool,

    /// Number of memory cells, including the reserved cell 0
    #[arg(long, value_name = "N")]
    memory: Option<usize>,

    /// Call stack capacity in entries
    #[arg(long, value_name = "N")]
    stack: Option<usize>,

    /// Open the inspector over the finished run
    #[arg(long)]
    inspect: bool,

    /// Byte budget for the inspector's snapshot history
    #[arg(long, value_name = "BYTES", default_value_t = 256 * 1024 * 1024)]
    snapshot_limit: usize,
}

impl Cli {
    fn settings(&self) -> Settings {
        let defaults = Limits::default();
        Settings {
            verbose: self.verbose,
            strict: self.strict,
            repl: self.file.is_none(),
            gc_enabled: !self.no_gc,
            limits: Limits {
                memory_size: self.memory.unwrap_or(defaults.memory_size),
                stack_size: self.stack.unwrap_or(defaults.stack_size),
                ..defaults
            },
        }
    }
}

fn print_new_output(host: &Host, printed: &mut usize) {
    for line in &host.output().lines[*printed..] {
        println!("{}", line.text);
    }
    *printed = host.output().len();
}

fn print_report(host: &Host, error: &VmError, source: Option<&SourceText>) {
    let painter = Painter {
        colored: io::stderr().is_terminal(),
    };
    let mut stderr = io::stderr().lock();
    if let Err(e) = report::report_error(
        &mut stderr,
        error,
        host.memory(),
        host.settings(),
        source,
        painter,
    ) {
        log::warn!("failed to write error report: {}", e);
    }
}

fn run_file(cli: &Cli, path: &PathBuf) -> Result<ExitCode> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let source = SourceText::new(path.display().to_string(), &text);

    let mut host = Host::new(cli.settings());
    let mut snapshots = SnapshotManager::new(cli.snapshot_limit);
    let mut recording = cli.inspect;
    let mut printed = 0;

    let summary = host.run(&text, |host, line, error| {
        print_new_output(host, &mut printed);
        if let Some(error) = error {
            print_report(host, error, Some(&source));
        }
        if recording {
            let snapshot =
                Snapshot::capture(host.memory(), host.output(), line, error.map(|e| e.to_string()));
            if let Err(message) = snapshots.push(snapshot) {
                log::warn!("{}; history stops at line {}", message, line);
                recording = false;
            }
        }
    });
    log::debug!(
        "{} commands, {} errors, halted: {}",
        summary.executed,
        summary.errors.len(),
        summary.halted
    );

    if cli.inspect {
        let capacity = host.memory().heap().capacity();
        let mut app = App::new(snapshots, host.output().clone(), text, capacity);
        inspect(&mut app)?;
    }

    Ok(if summary.halted {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_repl(cli: &Cli) -> Result<ExitCode> {
    let mut host = Host::new(cli.settings());
    let interactive = io::stdin().is_terminal();
    let mut history = String::new();
    let mut printed = 0;
    let mut line_number = 0u32;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("> ");
            io::stdout().flush()?;
        }
        let Some(text) = lines.next() else {
            break;
        };
        let text = text.context("Failed to read from stdin")?;
        line_number += 1;
        history.push_str(&text);
        history.push('\n');

        let result = host.run_line(&text, line_number);
        print_new_output(&host, &mut printed);
        if let Err(error) = result {
            let source = SourceText::new("<stdin>", &history);
            print_report(&host, &error, Some(&source));
            if error.is_fatal() || host.settings().strict {
                return Ok(ExitCode::FAILURE);
            }
            host.recover();
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn inspect(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app.run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result.context("Inspector error")
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.file {
        Some(path) => run_file(&cli, path),
        None => run_repl(&cli),
    }
}
