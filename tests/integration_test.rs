// Integration tests for the memory subsystem and the trace host

use wendy::memory::stack::Lookup;
use wendy::memory::value::{Address, Value};
use wendy::memory::Memory;
use wendy::snapshot::{Snapshot, SnapshotManager};
use wendy::vm::errors::VmError;
use wendy::vm::settings::{Limits, Settings};
use wendy::vm::trace::Host;

fn run_trace(source: &str) -> Host {
    let mut host = Host::new(Settings {
        strict: true,
        ..Settings::default()
    });
    let summary = host.run(source, |_, _, _| {});
    assert!(
        summary.errors.is_empty(),
        "trace failed: {:?}",
        summary.errors
    );
    host
}

#[test]
fn test_list_survives_collection_while_frame_is_live() {
    let mut memory = Memory::default();

    let base = memory.allocate(3, 1).unwrap();
    for (i, n) in [10.0, 20.0, 30.0].into_iter().enumerate() {
        memory.write(base.offset(i), Value::Number(n), 1).unwrap();
    }
    // Something in main that outlives the frame, so the list's cells end up
    // on the free list rather than back in the bump region
    let keep = memory.push_value(Value::String("kept".into()), 2).unwrap();
    memory.declare("keep", keep, 2).unwrap();

    memory.push_function_frame("f", 0x40, 3).unwrap();
    memory.declare("list", base, 3).unwrap();

    memory.collect(0, 4).unwrap();
    for (i, n) in [10.0, 20.0, 30.0].into_iter().enumerate() {
        assert_eq!(memory.read(base.offset(i), 4).unwrap(), &Value::Number(n));
    }
    assert!(memory.free_blocks().is_empty());

    memory.pop_frame(false, 5).unwrap();
    memory.collect(0, 6).unwrap();

    let blocks = memory.free_blocks();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].start, base);
    assert_eq!(blocks[0].size, 3);
    assert_eq!(memory.read(keep, 6).unwrap(), &Value::String("kept".into()));
    memory.check_invariants(6).unwrap();
}

#[test]
fn test_unreferenced_block_at_the_top_returns_to_bump_region() {
    let mut memory = Memory::default();
    let base = memory.allocate(3, 1).unwrap();
    memory.push_function_frame("f", 0x40, 2).unwrap();
    memory.declare("list", base, 2).unwrap();
    memory.pop_frame(true, 3).unwrap();

    memory.collect(0, 4).unwrap();
    assert_eq!(memory.pointers().memory_pointer, 1);
    assert_eq!(memory.allocate(3, 5).unwrap(), base);
}

#[test]
fn test_list_built_from_trace() {
    let host = run_trace(
        "push 10\npush 20\npush 30\nlist 3\nlet xs\ngc\nget xs\ncheck\n",
    );
    let memory = host.memory();
    let slot = memory.resolve("xs", Lookup::CurrentFrame, 9).unwrap();
    let header = memory.read(slot, 9).unwrap().as_reference().unwrap();
    let Value::ListHeader { len, start } = memory.read(header, 9).unwrap().clone() else {
        panic!("expected a list header at {}", header);
    };
    assert_eq!(len, 3);
    assert_eq!(memory.read(start.offset(2), 9).unwrap(), &Value::Number(30.0));
    assert_eq!(memory.top_arg(9).unwrap(), &Value::Reference(header));
}

#[test]
fn test_return_unwinds_nested_blocks() {
    let host = run_trace(
        "push 1\nlet g\nframe f 0x20\nblock while 0x30\nblock if 0x38\npush 2\nlet local\nret\ncheck\n",
    );
    let memory = host.memory();
    assert_eq!(memory.stack().depth(), 1);
    assert_eq!(memory.pointers().frame_pointer, 1);
    assert!(memory.exists("g", Lookup::CurrentFrame));
    assert!(!memory.exists("local", Lookup::AllFrames));
}

#[test]
fn test_end_pops_only_the_innermost_frame() {
    let host = run_trace("frame f 0x20\nblock for 0x24\npush 1\nlet i\nend\npush 2\nlet y\n");
    let memory = host.memory();
    assert_eq!(memory.stack().depth(), 2);
    assert!(!memory.exists("i", Lookup::AllFrames));
    assert!(memory.exists("y", Lookup::CurrentFrame));
}

#[test]
fn test_auto_frame_sees_enclosing_bindings_only_through_all_frames() {
    let mut host = Host::new(Settings::default());
    let summary = host.run(
        "push 5\nlet n\nblock while 0x10\nget n\nget! n\n",
        |_, _, _| {},
    );
    assert_eq!(summary.errors.len(), 1);
    assert!(matches!(
        summary.errors[0],
        VmError::UndefinedIdentifier { line: 4, .. }
    ));
    // Recovery unwound the block; get! on line 5 then ran in main
    assert_eq!(host.memory().top_arg(6).unwrap(), &Value::Number(5.0));
}

#[test]
fn test_closure_is_isolated_from_later_frame_changes() {
    let host = run_trace(
        "frame outer 0x10\n\
         push 1\nlet a\n\
         capture\nlet fn\n\
         push 99\nlet later\n\
         push 2\nset a\n\
         get fn\n\
         ret\n\
         call inner 0x18\n\
         get a\n\
         check\n",
    );
    let memory = host.memory();
    // `set a` rebound the live entry; the closure kept its own copy
    assert_eq!(memory.top_arg(15).unwrap(), &Value::Number(1.0));
    assert!(!memory.exists("later", Lookup::CurrentFrame));
    assert!(!memory.exists("fn", Lookup::CurrentFrame));
    let entries = memory.stack().current_frame();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_closure);
}

#[test]
fn test_closure_keeps_captured_cells_alive() {
    let host = run_trace(
        "frame make 0x10\npush \"captured\"\nlet s\ncapture\nret\ngc\ncall use 0x20\nget s\n",
    );
    assert_eq!(
        host.memory().top_arg(9).unwrap(),
        &Value::String("captured".into())
    );
    assert_eq!(host.memory().closures().len(), 1);
}

#[test]
fn test_calling_a_non_closure_is_a_type_error() {
    let mut host = Host::new(Settings::default());
    let summary = host.run("push 3\ncall f 0x10\n", |_, _, _| {});
    assert!(matches!(
        summary.errors[..],
        [VmError::TypeMismatch {
            expected: "closure",
            got: "number",
            line: 2
        }]
    ));
    assert_eq!(host.memory().stack().depth(), 1);
}

#[test]
fn test_native_call_leaves_one_result() {
    let host = run_trace("push 1\npush \"abc\"\nnative reverseString\nprint\npop\n");
    assert_eq!(host.output().get_output(), vec!["cba"]);
    assert!(host.memory().args().is_empty());
    host.memory().check_registers_balanced(6).unwrap();
}

#[test]
fn test_diagnostics_are_written_to_the_transcript() {
    let host = run_trace(
        "push 1\nlet x\nalloc 2\npop\npush 2\nlet y\nrelease @2 2\nframe f 0x20\nstack 2\nfree\n",
    );
    let output = host.output().get_output();
    assert_eq!(output[0], "[0x0003] <fn f> ret 0x20");
    assert_eq!(output[1], "[0x0002] y -> 0x0004");
    assert_eq!(output[2], "0x0002 .. 0x0004 (2 cells)");
}

#[test]
fn test_errors_carry_their_line() {
    let mut host = Host::new(Settings::default());
    let summary = host.run(
        "pop\nget missing\nret\nstore 0\nload 999999\nnative nope\n",
        |_, _, _| {},
    );
    let lines: Vec<u32> = summary.errors.iter().map(VmError::line).collect();
    assert_eq!(lines, vec![1, 2, 3, 4, 5, 6]);
    assert!(!summary.halted);
}

#[test]
fn test_fatal_errors_halt_the_run() {
    let mut host = Host::new(Settings {
        limits: Limits {
            memory_size: 8,
            ..Limits::default()
        },
        ..Settings::default()
    });
    let summary = host.run("alloc 4\nlet a\nalloc 6\npush 1\n", |_, _, _| {});
    assert!(summary.halted);
    assert_eq!(summary.executed, 3);
    assert!(matches!(
        summary.errors[..],
        [VmError::OutOfMemory {
            requested: 6,
            line: 3
        }]
    ));
}

#[test]
fn test_disabled_collector_keeps_garbage() {
    let mut host = Host::new(Settings {
        gc_enabled: false,
        limits: Limits {
            memory_size: 8,
            ..Limits::default()
        },
        ..Settings::default()
    });
    let summary = host.run("alloc 6\npop\nalloc 4\n", |_, _, _| {});
    assert!(matches!(summary.errors[..], [VmError::OutOfMemory { line: 3, .. }]));
}

#[test]
fn test_snapshot_history_respects_limit() {
    let mut host = Host::new(Settings::default());
    let mut snapshots = SnapshotManager::new(4096);
    let mut refused = 0;
    host.run(&"push 1\nlet x\n".repeat(50), |host, line, error| {
        let snapshot = Snapshot::capture(host.memory(), host.output(), line, error.map(|e| e.to_string()));
        if snapshots.push(snapshot).is_err() {
            refused += 1;
        }
    });

    assert!(refused > 0);
    assert!(snapshots.memory_usage() <= snapshots.memory_limit());
    let first = snapshots.get(0).unwrap();
    assert_eq!(first.line, 1);
    assert_eq!(first.args, vec![Value::Number(1.0)]);
    assert_eq!(first.registers, Vec::<Address>::new());
}
