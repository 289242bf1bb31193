//! The evaluator.
//!
//! Every runtime value is a closure: a function id plus the cells captured
//! for its free identifiers. Cells are shared mutable slots
//! (`Rc<RefCell<Closure>>`), so an assignment through one closure is visible
//! to every closure that captured the same cell.
//!
//! Execution uses an explicit frame stack instead of the host call stack.
//! Each frame walks the body of one function, folding elements into an
//! accumulator. Evaluating an element that denotes the empty function yields
//! the *meta* closure, which triggers a six-way dispatch on the state of the
//! accumulator and the shape of the following element; this is where all I/O
//! and cell assignment happens. A call whose caller frame has no elements
//! left replaces the caller in place, so iterative programs run in constant
//! stack space.
//!
//! One iteration of the outer loop is one tick. Budgets are exact tick
//! counts; running out of budget is an ordinary outcome, not an error.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use ahash::RandomState;

use crate::io::BitIo;
use crate::parse::{Elem, FunctionId, Program};
use crate::tokenize::SyntaxError;

/// Shared mutable cell holding a closure.
pub(crate) type CellRef = Rc<RefCell<Closure>>;

/// Environment of a closure: slot id to the cell backing it.
pub(crate) type Env = HashMap<u32, CellRef, RandomState>;

/// A function paired with the cells captured for its free identifiers.
///
/// Closures held in cells and accumulators are templates: they never carry a
/// cell for the function's own argument. Only when a closure is called does
/// the new frame receive an argument cell (and only if the function actually
/// references its argument).
#[derive(Clone)]
pub struct Closure {
    pub(crate) func: FunctionId,
    pub(crate) env: Env,
}

impl Closure {
    pub(crate) fn new(func: FunctionId, env: Env) -> Self {
        Self { func, env }
    }

    /// Closure over a function with no free identifiers.
    pub(crate) fn over(func: FunctionId) -> Self {
        Self {
            func,
            env: Env::default(),
        }
    }

    #[inline]
    pub(crate) fn is_meta(&self, program: &Program) -> bool {
        program.func(self.func).is_meta()
    }
}

// Cell graphs may be cyclic, so the derived Debug would not terminate.
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut slots: Vec<u32> = self.env.keys().copied().collect();
        slots.sort_unstable();
        write!(f, "Closure(f{}, cells {slots:?})", self.func.index())
    }
}

/// One entry of the evaluation stack: a closure being walked, a cursor into
/// its body, and the accumulator.
#[derive(Debug)]
pub(crate) struct StackFrame {
    pub(crate) closure: Closure,
    pub(crate) cursor: usize,
    pub(crate) val: Option<Closure>,
}

impl StackFrame {
    pub(crate) fn resumed(closure: Closure, cursor: usize, val: Option<Closure>) -> Self {
        Self {
            closure,
            cursor,
            val,
        }
    }

    /// Activates a call: the callee's environment gains a fresh cell for the
    /// argument, or the argument is dropped if the callee never reads it.
    fn activate(program: &Program, callee: Closure, arg: Closure) -> Self {
        let Closure { func, mut env } = callee;
        let meta = program.func(func);
        if meta.arg_used() {
            env.insert(meta.depth() - 1, Rc::new(RefCell::new(arg)));
        }
        Self {
            closure: Closure { func, env },
            cursor: 0,
            val: None,
        }
    }

    /// Builds a literal closure over `func`, capturing the cells its free
    /// identifiers name from this frame. The parser guarantees every such
    /// slot is present in the frame's environment.
    fn capture(&self, program: &Program, func: FunctionId) -> Closure {
        let free = program.func(func).free_idents();
        let mut env = Env::with_capacity_and_hasher(free.len(), RandomState::default());
        for &id in free {
            env.insert(id, Rc::clone(&self.closure.env[&id]));
        }
        Closure { func, env }
    }

    /// Evaluates one body element to a closure value. Identifiers dereference
    /// their cell; function literals capture.
    fn eval(&self, program: &Program, elem: Elem) -> Closure {
        match elem {
            Elem::Ident(id) => self.closure.env[&id].borrow().clone(),
            Elem::Func(func) => self.capture(program, func),
        }
    }
}

/// Result of [`Engine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The stack emptied; the program is finished.
    Complete,
    /// The tick budget ran out first. The engine can be resumed.
    BudgetExceeded,
}

/// The virtual machine: a parsed program plus its evaluation stack.
#[derive(Debug)]
pub struct Engine {
    program: Program,
    stack: Vec<StackFrame>,
}

impl Engine {
    /// Parses source text and prepares a single frame over the root.
    pub fn new(src: &str) -> Result<Self, SyntaxError> {
        Ok(Self::from_program(Program::parse(src)?))
    }

    #[must_use]
    pub fn from_program(program: Program) -> Self {
        let mut engine = Self {
            program,
            stack: Vec::new(),
        };
        engine.reset();
        engine
    }

    pub(crate) fn from_parts(program: Program, stack: Vec<StackFrame>) -> Self {
        Self { program, stack }
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub(crate) fn stack(&self) -> &[StackFrame] {
        &self.stack
    }

    /// Discards all execution state and restarts from the root function.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.stack.push(StackFrame {
            closure: Closure::over(FunctionId::ROOT),
            cursor: 0,
            val: None,
        });
    }

    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.stack.is_empty()
    }

    /// Runs until the stack empties or the budget is spent. `None` means no
    /// budget. A budget of `n` allows exactly `n` ticks.
    pub fn run(&mut self, io: &mut dyn BitIo, budget: Option<u64>) -> RunOutcome {
        let mut remaining = budget;
        while !self.stack.is_empty() {
            if let Some(ticks) = remaining.as_mut() {
                if *ticks == 0 {
                    return RunOutcome::BudgetExceeded;
                }
                *ticks -= 1;
            }
            self.step(io);
        }
        RunOutcome::Complete
    }

    /// One tick.
    fn step(&mut self, io: &mut dyn BitIo) {
        let program = &self.program;
        let Some(top) = self.stack.last() else { return };

        if top.cursor == program.func(top.closure.func).elems().len() {
            let Some(frame) = self.stack.pop() else { return };
            let val = match frame.val {
                Some(val) => val,
                // An exhausted frame with an empty accumulator returns a
                // closure over its own function; a called meta closure
                // returns itself.
                None => frame.capture(program, frame.closure.func),
            };
            if let Some(parent) = self.stack.last_mut() {
                parent.val = Some(val);
            }
            return;
        }

        let Some(frame) = self.stack.last_mut() else { return };
        let elems = program.func(frame.closure.func).elems();
        let elem = elems[frame.cursor];
        frame.cursor += 1;

        let v = frame.eval(program, elem);

        // A deferred call: (callee, argument).
        let call: Option<(Closure, Closure)>;

        if v.is_meta(program) {
            let next = if frame.cursor < elems.len() {
                let e = elems[frame.cursor];
                frame.cursor += 1;
                Some(e)
            } else {
                None
            };

            call = match (frame.val.as_ref(), next) {
                // Empty accumulator, nothing follows: the meta closure itself
                // becomes the accumulator.
                (None, None) => {
                    frame.val = Some(v);
                    None
                }
                // Empty accumulator, identifier follows: emit a 1 bit and
                // load the identifier's value.
                (None, Some(Elem::Ident(id))) => {
                    io.write_bit(1);
                    frame.val = Some(frame.closure.env[&id].borrow().clone());
                    None
                }
                // Empty accumulator, function follows: read a bit; 1 calls
                // the function with the meta closure, 0 just returns it.
                (None, Some(next @ Elem::Func(_))) => {
                    let n = frame.eval(program, next);
                    if io.read_bit() & 1 == 1 {
                        Some((n, v))
                    } else {
                        frame.val = Some(n);
                        None
                    }
                }
                // Accumulator held, nothing follows: emit a 0 bit; the
                // accumulator stays.
                (Some(_), None) => {
                    io.write_bit(0);
                    None
                }
                // Accumulator held, identifier follows: assign the
                // accumulator into the identifier's cell; the accumulator
                // stays.
                (Some(val), Some(Elem::Ident(id))) => {
                    *frame.closure.env[&id].borrow_mut() = val.clone();
                    None
                }
                // Accumulator held, function follows: call it with the
                // accumulator as argument.
                (Some(val), Some(next @ Elem::Func(_))) => {
                    let arg = val.clone();
                    Some((frame.eval(program, next), arg))
                }
            };
        } else if frame.val.is_none() {
            frame.val = Some(v);
            call = None;
        } else if let Some(val) = frame.val.as_ref() {
            call = Some((val.clone(), v));
        } else {
            call = None;
        }

        if let Some((callee, arg)) = call {
            self.call(callee, arg);
        }
    }

    /// Pushes a frame for `callee(arg)`, replacing the caller in place when
    /// the caller has nothing left to do.
    fn call(&mut self, callee: Closure, arg: Closure) {
        let frame = StackFrame::activate(&self.program, callee, arg);
        let replace = self.stack.last().is_some_and(|top| {
            top.cursor == self.program.func(top.closure.func).elems().len()
        });
        if replace {
            if let Some(top) = self.stack.last_mut() {
                *top = frame;
            }
        } else {
            self.stack.push(frame);
        }
    }
}
