//! A sandboxed, snapshotable interpreter for the Functasy esoteric language.
//!
//! Functasy programs are built from nothing but balanced parentheses and
//! base-62 identifiers; every runtime value is a closure. The empty function
//! `()` evaluates to the *meta* closure, whose behavior depends on where it
//! appears, and all input, output and mutation happen through it. See the
//! module docs of [`engine`] for the dispatch rules.
//!
//! The interpreter never touches the host call stack for program recursion
//! and does all I/O through the [`io::BitIo`] trait, so untrusted programs
//! are confined to a tick budget and a pair of bit streams. A running engine
//! can be serialized with [`Engine::save`] and resumed later, on a different
//! host, with [`Engine::load`].
//!
//! ```
//! use functasy::{run, Output};
//!
//! let out = run("(()0)(0)", b"", true, Some(1000))?;
//! assert_eq!(out, Output::Complete(vec![0x01]));
//! # Ok::<(), functasy::SyntaxError>(())
//! ```

pub mod bits;
pub mod engine;
pub mod idents;
pub mod io;
pub mod parse;
pub mod snapshot;
pub mod tokenize;

pub use engine::{Engine, RunOutcome};
pub use io::{BitIo, ByteIo, TextBitIo};
pub use parse::{Elem, Function, FunctionId, Program};
pub use snapshot::SnapshotError;
pub use tokenize::SyntaxError;

/// Outcome of [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// The program finished; these are the bytes it wrote.
    Complete(Vec<u8>),
    /// The tick budget ran out first.
    BudgetExceeded,
}

/// Parses and runs a program over byte buffers in one call.
///
/// `padded` selects the input framing (see [`ByteIo`]); `budget` is an exact
/// tick count, `None` for unlimited.
pub fn run(
    src: &str,
    input: &[u8],
    padded: bool,
    budget: Option<u64>,
) -> Result<Output, SyntaxError> {
    let mut engine = Engine::new(src)?;
    let mut io = ByteIo::new(input, padded);
    match engine.run(&mut io, budget) {
        RunOutcome::Complete => Ok(Output::Complete(io.into_output())),
        RunOutcome::BudgetExceeded => Ok(Output::BudgetExceeded),
    }
}
