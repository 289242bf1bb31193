//! Snapshot round trips on real programs, cut at assorted tick offsets.

use functasy::{ByteIo, Engine, RunOutcome, SnapshotError};
use pretty_assertions::assert_eq;

const CAT: &str = "((((((()(()(7022)))()301()(())0)()20)0)0)(0()))(0)";

fn emitter_src(bytes: &[u8]) -> String {
    let mut src = String::from("(0");
    for byte in bytes {
        for bit in 0..8 {
            src.push_str(if byte >> bit & 1 == 1 { "()(()0)" } else { "()(0())" });
        }
    }
    src.push_str(")(0)");
    src
}

/// Runs `ticks`, snapshots, and checks the restored engine finishes with
/// exactly the same output as the original.
fn resume_matches(src: &str, input: &[u8], ticks: u64) {
    let mut engine = Engine::new(src).unwrap();
    let mut io = ByteIo::padded(input);
    engine.run(&mut io, Some(ticks));

    let snapshot = engine.save();
    let mut restored = Engine::load(&snapshot).unwrap();
    let mut restored_io = io.clone();

    assert_eq!(engine.run(&mut io, None), RunOutcome::Complete);
    assert_eq!(restored.run(&mut restored_io, None), RunOutcome::Complete);

    assert_eq!(restored_io.into_output(), io.into_output());
}

#[test]
fn hello_world_resumes_at_any_offset() {
    let src = emitter_src(b"Hello, World!");
    for ticks in [1, 7, 52, 311, 700] {
        resume_matches(&src, b"", ticks);
    }
}

#[test]
fn cat_resumes_at_any_offset() {
    // Cat keeps live state in shared cells and buried frames, so these cuts
    // exercise cell aliasing across the snapshot.
    let input = b"Snapshots preserve aliasing";
    for ticks in [1, 16, 250, 1024, 3000] {
        resume_matches(CAT, input, ticks);
    }
}

#[test]
fn restored_output_matches_original_bytes() {
    let input = b"round trip payload";
    let mut engine = Engine::new(CAT).unwrap();
    let mut io = ByteIo::padded(input);
    engine.run(&mut io, Some(1500));

    let mut restored = Engine::load(&engine.save()).unwrap();
    let mut restored_io = io.clone();
    restored.run(&mut restored_io, None);

    assert_eq!(restored_io.into_output(), input.to_vec());
}

#[test]
fn snapshot_is_stable_across_a_round_trip() {
    let mut engine = Engine::new(CAT).unwrap();
    let mut io = ByteIo::padded(b"abc".as_slice());
    engine.run(&mut io, Some(200));

    let snapshot = engine.save();
    let restored = Engine::load(&snapshot).unwrap();
    assert_eq!(restored.save(), snapshot);
}

#[test]
fn corrupted_snapshot_is_rejected() {
    let mut engine = Engine::new(CAT).unwrap();
    let mut io = ByteIo::padded(b"xyz".as_slice());
    engine.run(&mut io, Some(500));

    let mut snapshot = engine.save();
    snapshot.push(0x80);
    assert_eq!(
        Engine::load(&snapshot).unwrap_err(),
        SnapshotError::TrailingData,
    );
}
