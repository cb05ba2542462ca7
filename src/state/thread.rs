//! A single thread's control state: its position in the IR, its call stack,
//! and its scheduling status. Threads never see other threads' call stacks;
//! all cross-thread coordination goes through the owning `State`'s mutex and
//! wait maps.

use std::collections::HashMap;

use crate::ir::{FuncId, InstrId, Tid, Value};
use crate::ir::program::Pc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Paused,
    Detached,
    Exited,
}

/// One call-stack frame. `locals` binds each instruction in `function` that
/// has already executed and produced a value to that value — the strict-SSA
/// IR never reassigns an `InstrId`, so this map only grows within a frame's
/// lifetime. `dest` is where the frame's eventual return value is written in
/// the *caller's* frame; `None` for a thread's outermost frame (returning
/// there exits the thread instead).
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: FuncId,
    pub args: Vec<Value>,
    pub locals: HashMap<InstrId, Value>,
    pub return_pc: Option<Pc>,
    pub dest: Option<InstrId>,
}

impl Frame {
    pub fn new(function: FuncId, args: Vec<Value>, return_pc: Option<Pc>, dest: Option<InstrId>) -> Frame {
        Frame { function, args, locals: HashMap::new(), return_pc, dest }
    }
}

#[derive(Debug, Clone)]
pub struct Thread {
    pub tid: Tid,
    pub pc: Pc,
    pub call_stack: Vec<Frame>,
    pub status: ThreadStatus,
    pub in_atomic: bool,
}

impl Thread {
    pub fn new(tid: Tid, pc: Pc, initial_frame: Frame) -> Thread {
        Thread { tid, pc, call_stack: vec![initial_frame], status: ThreadStatus::Running, in_atomic: false }
    }

    pub fn current_frame(&self) -> &Frame {
        self.call_stack.last().expect("a live thread always has at least one frame")
    }

    pub fn current_frame_mut(&mut self) -> &mut Frame {
        self.call_stack.last_mut().expect("a live thread always has at least one frame")
    }

    pub fn is_enabled(&self) -> bool {
        self.status == ThreadStatus::Running
    }
}
