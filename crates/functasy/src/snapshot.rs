//! Snapshot serializer.
//!
//! A snapshot captures a whole engine mid-run: the function tree followed by
//! the frame stack, bottom to top. It is a pure bit stream built from the
//! primitives in [`crate::bits`], with trailing zero bytes stripped.
//!
//! The function tree is an element stream: one continuation bit per slot, a
//! type bit for every element below the root, and identifiers encoded
//! relative to their depth. Functions reappear in the same preorder the
//! parser assigns, so arena indices survive the round trip.
//!
//! Cells are the only aliased state in the machine, so they are the only
//! thing deduplicated: the first occurrence of a cell writes a 1 bit and its
//! closure, later occurrences write a 0 bit and the index of the first
//! occurrence. A cell is registered before its contents, which keeps cyclic
//! graphs finite; the closure contents of new cells follow in breadth-first
//! order, queue for queue with the loader, so neither side ever recurses as
//! deep as the cell graph. Closure values themselves are never deduplicated;
//! sharing already bounds the expansion because each distinct cell is spelled
//! out exactly once.
//!
//! Loading fails closed: a back-reference before any cell exists and any
//! stray 1 bit after the frame-list terminator are both rejected.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use ahash::RandomState;
use indexmap::IndexSet;

use crate::bits::{BitReader, BitWriter};
use crate::engine::{CellRef, Closure, Engine, Env, StackFrame};
use crate::parse::{Elem, FunctionId, Program, ProgramBuilder};

/// A snapshot that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    /// A cell back-reference appeared before any cell was defined.
    DanglingBackref,
    /// A 1 bit appeared after the frame-list terminator.
    TrailingData,
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingBackref => {
                write!(f, "back-reference to a cell that was never defined")
            }
            Self::TrailingData => write!(f, "unexpected data after the frame list"),
        }
    }
}

impl std::error::Error for SnapshotError {}

struct Saver<'a> {
    program: &'a Program,
    writer: BitWriter,
    /// Cell identities (by allocation address) in first-seen order.
    cells: IndexSet<usize, RandomState>,
}

impl Saver<'_> {
    fn write_func_index(&mut self, func: FunctionId) {
        self.writer
            .write_var(func.index() as u32, self.program.len() as u32 - 1);
    }

    /// Element stream of the whole function tree, depth first.
    fn save_funcs(&mut self) {
        let program = self.program;
        let mut stack: Vec<(FunctionId, usize)> = vec![(FunctionId::ROOT, 0)];

        while let Some(frame) = stack.last_mut() {
            let func = program.func(frame.0);
            if frame.1 == func.elems().len() {
                self.writer.write_bit(0);
                stack.pop();
                continue;
            }
            let elem = func.elems()[frame.1];
            frame.1 += 1;

            self.writer.write_bit(1);
            match elem {
                Elem::Ident(id) => {
                    self.writer.write_bit(0);
                    self.writer.write_var(id, stack.len() as u32 - 2);
                }
                Elem::Func(child) => {
                    // The root can only hold functions, so its elements carry
                    // no type bit.
                    if stack.len() != 1 {
                        self.writer.write_bit(1);
                    }
                    stack.push((child, 0));
                }
            }
        }
    }

    /// Serializes the graph reachable from one cell, breadth first. New cells
    /// write a 1 bit and their closure; already-seen cells write a 0 bit and
    /// their first-seen index.
    fn save_cell(&mut self, cell: &CellRef) {
        let program = self.program;
        let mut queue = VecDeque::new();
        queue.push_back(Rc::clone(cell));

        while let Some(cell) = queue.pop_front() {
            let key = Rc::as_ptr(&cell) as usize;
            if let Some(index) = self.cells.get_index_of(&key) {
                self.writer.write_bit(0);
                self.writer
                    .write_var(index as u32, self.cells.len() as u32 - 1);
                continue;
            }

            self.cells.insert(key);
            self.writer.write_bit(1);

            let closure = cell.borrow();
            self.write_func_index(closure.func);
            for &id in program.func(closure.func).free_idents() {
                queue.push_back(Rc::clone(&closure.env[&id]));
            }
        }
    }

    /// A template closure: function index plus the cells of its free
    /// identifiers.
    fn save_template(&mut self, closure: &Closure) {
        let program = self.program;
        self.write_func_index(closure.func);
        for &id in program.func(closure.func).free_idents() {
            self.save_cell(&closure.env[&id]);
        }
    }

    fn save_frame(&mut self, frame: &StackFrame) {
        let program = self.program;
        self.writer.write_bit(1);

        let func = program.func(frame.closure.func);
        self.write_func_index(frame.closure.func);
        for &id in func.free_idents() {
            self.save_cell(&frame.closure.env[&id]);
        }
        if func.arg_used() {
            self.save_cell(&frame.closure.env[&(func.depth() - 1)]);
        }

        self.writer
            .write_var(frame.cursor as u32, func.elems().len() as u32);

        match &frame.val {
            None => self.writer.write_bit(0),
            Some(val) => {
                self.writer.write_bit(1);
                self.save_template(val);
            }
        }
    }
}

struct Loader<'a> {
    reader: BitReader<'a>,
    /// Cells in first-seen order; indices mirror the saver's table.
    cells: Vec<CellRef>,
}

impl Loader<'_> {
    fn read_func_index(&mut self, program: &Program) -> FunctionId {
        FunctionId::from_index(self.reader.read_var(program.len() as u32 - 1) as usize)
    }

    fn load_funcs(&mut self) -> Program {
        let mut builder = ProgramBuilder::new();
        loop {
            if self.reader.read_bit() == 0 {
                if builder.depth() == 0 {
                    break;
                }
                builder.close_func();
                continue;
            }
            if builder.depth() != 0 && self.reader.read_bit() == 0 {
                let id = self.reader.read_var(builder.depth() - 1);
                builder.push_ident(id);
                continue;
            }
            builder.open_func();
        }
        builder.finish()
    }

    /// Reads one cell header. A new cell is registered immediately as a
    /// placeholder and queued; its closure is filled in when the queue
    /// reaches it, which is exactly when the saver wrote it.
    fn load_header(
        &mut self,
        program: &Program,
        pending: &mut VecDeque<(CellRef, FunctionId)>,
    ) -> Result<CellRef, SnapshotError> {
        if self.reader.read_bit() == 0 {
            if self.cells.is_empty() {
                return Err(SnapshotError::DanglingBackref);
            }
            let index = self.reader.read_var(self.cells.len() as u32 - 1) as usize;
            return Ok(Rc::clone(&self.cells[index]));
        }

        let func = self.read_func_index(program);
        let cell = Rc::new(RefCell::new(Closure::over(func)));
        self.cells.push(Rc::clone(&cell));
        pending.push_back((Rc::clone(&cell), func));
        Ok(cell)
    }

    fn load_cell(&mut self, program: &Program) -> Result<CellRef, SnapshotError> {
        let mut pending = VecDeque::new();
        let root = self.load_header(program, &mut pending)?;

        while let Some((cell, func)) = pending.pop_front() {
            let free = program.func(func).free_idents();
            let mut env = Env::with_capacity_and_hasher(free.len(), RandomState::default());
            for &id in free {
                env.insert(id, self.load_header(program, &mut pending)?);
            }
            *cell.borrow_mut() = Closure::new(func, env);
        }

        Ok(root)
    }

    fn load_template(&mut self, program: &Program) -> Result<Closure, SnapshotError> {
        let func = self.read_func_index(program);
        let free = program.func(func).free_idents();
        let mut env = Env::with_capacity_and_hasher(free.len(), RandomState::default());
        for &id in free {
            env.insert(id, self.load_cell(program)?);
        }
        Ok(Closure::new(func, env))
    }

    fn load_frame(&mut self, program: &Program) -> Result<StackFrame, SnapshotError> {
        let id = self.read_func_index(program);
        let func = program.func(id);

        let mut env = Env::default();
        for &slot in func.free_idents() {
            let cell = self.load_cell(program)?;
            env.insert(slot, cell);
        }
        if func.arg_used() {
            let cell = self.load_cell(program)?;
            env.insert(func.depth() - 1, cell);
        }

        let cursor = self.reader.read_var(func.elems().len() as u32) as usize;
        let val = if self.reader.read_bit() == 1 {
            Some(self.load_template(program)?)
        } else {
            None
        };

        Ok(StackFrame::resumed(Closure::new(id, env), cursor, val))
    }
}

impl Engine {
    /// Serializes the engine state to a trimmed byte buffer.
    #[must_use]
    pub fn save(&self) -> Vec<u8> {
        let mut saver = Saver {
            program: self.program(),
            writer: BitWriter::new(),
            cells: IndexSet::default(),
        };

        saver.save_funcs();
        for frame in self.stack() {
            saver.save_frame(frame);
        }
        saver.writer.write_bit(0);

        saver.writer.into_trimmed()
    }

    /// Rebuilds an engine from a snapshot. Resuming the result against the
    /// same I/O state behaves bit for bit like resuming the original.
    pub fn load(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let mut loader = Loader {
            reader: BitReader::new(bytes),
            cells: Vec::new(),
        };

        let program = loader.load_funcs();

        let mut stack = Vec::new();
        while loader.reader.read_bit() == 1 {
            stack.push(loader.load_frame(&program)?);
        }

        if !loader.reader.rest_is_zero() {
            return Err(SnapshotError::TrailingData);
        }

        Ok(Self::from_parts(program, stack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RunOutcome;
    use crate::io::ByteIo;

    fn resume_matches(src: &str, input: &[u8], ticks: u64) {
        let mut engine = Engine::new(src).unwrap();
        let mut io = ByteIo::padded(input);
        assert_eq!(engine.run(&mut io, Some(ticks)), RunOutcome::BudgetExceeded);

        let snapshot = engine.save();
        let mut restored = Engine::load(&snapshot).unwrap();
        let mut restored_io = io.clone();

        engine.run(&mut io, None);
        restored.run(&mut restored_io, None);

        assert_eq!(io.into_output(), restored_io.into_output());
    }

    #[test]
    fn fresh_engine_round_trip() {
        let engine = Engine::new("(()(0))(0)").unwrap();
        let snapshot = engine.save();
        let restored = Engine::load(&snapshot).unwrap();
        assert_eq!(
            restored.program().to_source(FunctionId::ROOT),
            "(()(0))(0)",
        );
        assert_eq!(restored.save(), snapshot);
    }

    #[test]
    fn empty_snapshot_is_a_finished_engine() {
        let engine = Engine::load(&[]).unwrap();
        assert!(engine.is_finished());
    }

    #[test]
    fn mid_run_round_trip() {
        // The program completes on tick 5, so every cut here is mid-run.
        for ticks in 1..5 {
            resume_matches("(()(()0))(0)", &[0xff], ticks);
        }
    }

    #[test]
    fn dangling_backref_is_rejected() {
        // Function tree for ((0)) followed by one frame over the innermost
        // function whose first cell is a back-reference into an empty table.
        let mut w = BitWriter::new();
        for bit in [1, 1, 1, 1, 0, 0, 0, 0, 0] {
            w.write_bit(bit);
        }
        w.write_bit(1); // a stack frame
        w.write_var(2, 2); // closure over function 2
        w.write_bit(0); // back-reference, but no cell exists yet
        let bytes = w.into_bytes();

        assert_eq!(
            Engine::load(&bytes).unwrap_err(),
            SnapshotError::DanglingBackref,
        );
    }

    #[test]
    fn trailing_data_is_rejected() {
        let engine = Engine::new("(0)(())").unwrap();
        let mut snapshot = engine.save();
        snapshot.push(0x80);
        assert_eq!(
            Engine::load(&snapshot).unwrap_err(),
            SnapshotError::TrailingData,
        );
    }
}
