//! The per-branch symbolic state: everything the interpreter needs to
//! execute one more instruction, and everything the driver needs to clone
//! when it forks a successor. The IR (`Program`) is shared by reference and
//! never cloned; every other field is deep-cloned on branch (§5 of the
//! design notes: "Cloning a state performs a deep copy of all mutable
//! per-state structures").

pub mod thread;

use std::collections::HashMap;

use crate::ir::program::Pc;
use crate::ir::{FuncId, ObjectId, Program, Tid, Value};
use crate::memory::{MemoryModel, ReferenceMemory};
use crate::state::thread::{Frame, Thread, ThreadStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryErrorKind {
    OutOfBounds,
    UninitRead,
    InvalidObject,
    DataRace,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Assertion,
    Memory(MemoryErrorKind),
    NonTermination,
    Generic(String),
}

/// Terminal/non-terminal classification of a state, per the error-surface
/// design (§4.5). `Ready` states are the only ones the driver may still step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateStatus {
    Ready,
    Exited(i32),
    Terminated(String),
    Killed(String),
    Error(ErrorKind),
}

impl StateStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, StateStatus::Ready)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_ready()
    }
}

/// The per-branch symbolic state. `trace_depth` is a back-reference to the
/// driver-owned `Trace`: not the trace itself (the trace is mutated in place
/// by the single DFS driver, never cloned per branch — see §5), but the
/// prefix length at which this state was produced, so error reporting can
/// name which trace position it corresponds to.
#[derive(Debug, Clone)]
pub struct State {
    pub threads: std::collections::BTreeMap<Tid, Thread>,
    pub next_tid: Tid,
    pub memory: ReferenceMemory,
    pub path_condition: Vec<Value>,
    pub mutexes: HashMap<ObjectId, Option<Tid>>,
    pub wait_mutex: HashMap<ObjectId, Vec<Tid>>,
    pub wait_join: HashMap<Tid, Vec<Tid>>,
    pub exited_threads: HashMap<Tid, Value>,
    pub status: StateStatus,
    pub current_thread: Tid,
    pub trace_depth: usize,
    /// `globals[i]`'s backing object, allocated once by `run_globals` before
    /// the first `explore()` call (grounded in the source's static-globals
    /// pass run ahead of interleaving exploration).
    pub global_objects: Vec<ObjectId>,
}

impl State {
    pub fn new(program: &Program) -> State {
        let entry = program.entry();
        let initial_frame = Frame::new(entry, Vec::new(), None, None);
        let pc = Pc::at_block(entry, program.func(entry).entry_block());
        let mut threads = std::collections::BTreeMap::new();
        threads.insert(0, Thread::new(0, pc, initial_frame));
        State {
            threads,
            next_tid: 1,
            memory: ReferenceMemory::new(),
            path_condition: Vec::new(),
            mutexes: HashMap::new(),
            wait_mutex: HashMap::new(),
            wait_join: HashMap::new(),
            exited_threads: HashMap::new(),
            status: StateStatus::Ready,
            current_thread: 0,
            trace_depth: 0,
            global_objects: Vec::new(),
        }
    }

    /// Allocates every `Program` global into fresh memory objects, in
    /// declaration order, and records their object ids. Must run exactly
    /// once, before the first instruction of any thread executes.
    pub fn run_globals(&mut self, program: &Program) {
        self.global_objects = program
            .globals
            .iter()
            .map(|g| self.memory.allocate(g.size_bytes, true, g.zeroed))
            .collect();
    }

    pub fn thread(&self, tid: Tid) -> &Thread {
        &self.threads[&tid]
    }

    pub fn thread_mut(&mut self, tid: Tid) -> &mut Thread {
        self.threads.get_mut(&tid).expect("thread id must be live")
    }

    /// Running and not blocked on a mutex or a join — the set the driver may
    /// pick its next step from. If some thread is mid-`__VERIFIER_atomic_begin
    /// /end` region, §4.2/§5 require the region to be scheduled as a single
    /// unit: no other thread may be interleaved until it ends, so the enabled
    /// set collapses to that one thread alone.
    pub fn enabled_threads(&self) -> Vec<Tid> {
        if let Some(t) = self.threads.values().find(|t| t.is_enabled() && t.in_atomic) {
            return vec![t.tid];
        }
        self.threads.values().filter(|t| t.is_enabled()).map(|t| t.tid).collect()
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn spawn_thread(&mut self, function: FuncId, args: Vec<Value>, pc: Pc) -> Tid {
        let tid = self.next_tid;
        self.next_tid += 1;
        let frame = Frame::new(function, args, None, None);
        self.threads.insert(tid, Thread::new(tid, pc, frame));
        tid
    }

    pub fn pause(&mut self, tid: Tid) {
        self.thread_mut(tid).status = ThreadStatus::Paused;
    }

    pub fn unpause(&mut self, tid: Tid) {
        self.thread_mut(tid).status = ThreadStatus::Running;
    }

    pub fn mutex_init(&mut self, object: ObjectId) {
        self.mutexes.insert(object, None);
    }

    pub fn mutex_destroy(&mut self, object: ObjectId) {
        self.mutexes.remove(&object);
        self.wait_mutex.remove(&object);
    }

    pub fn has_mutex(&self, object: ObjectId) -> bool {
        self.mutexes.contains_key(&object)
    }

    pub fn mutex_locked_by(&self, object: ObjectId) -> Option<Tid> {
        self.mutexes.get(&object).copied().flatten()
    }

    /// Returns true if the lock was acquired; false if the caller must pause.
    pub fn mutex_lock(&mut self, object: ObjectId, tid: Tid) -> bool {
        match self.mutexes.get(&object) {
            Some(None) => {
                self.mutexes.insert(object, Some(tid));
                true
            }
            _ => false,
        }
    }

    pub fn mutex_wait(&mut self, object: ObjectId, tid: Tid) {
        self.pause(tid);
        self.wait_mutex.entry(object).or_default().push(tid);
    }

    pub fn mutex_unlock(&mut self, object: ObjectId) {
        self.mutexes.insert(object, None);
        if let Some(waiters) = self.wait_mutex.remove(&object) {
            for tid in waiters {
                self.unpause(tid);
            }
        }
    }

    /// Records `tid`'s exit with `retval` and wakes any threads already
    /// waiting to join it.
    pub fn exit_thread(&mut self, tid: Tid, retval: Value) {
        self.exited_threads.insert(tid, retval.clone());
        self.threads.remove(&tid);
        if let Some(waiters) = self.wait_join.remove(&tid) {
            for waiter in waiters {
                self.unpause(waiter);
            }
        }
    }

    /// Either delivers `tid`'s return value immediately (it already exited)
    /// or marks the joining thread paused and registers the wait.
    pub fn join(&mut self, tid: Tid, joiner: Tid) -> Option<Value> {
        if let Some(retval) = self.exited_threads.get(&tid) {
            return Some(retval.clone());
        }
        self.wait_join.entry(tid).or_default().push(joiner);
        self.pause(joiner);
        None
    }

    /// A deadlock iff no thread is enabled but at least one is still live
    /// (Paused or Detached, never having exited).
    pub fn is_deadlocked(&self) -> bool {
        !self.threads.is_empty() && self.enabled_threads().is_empty()
    }

    pub fn is_fully_exited(&self) -> bool {
        self.threads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::program::{BasicBlock, Function};
    use crate::ir::{InstrKind, Instruction};
    use crate::ir::types::InstrId;

    fn tiny_program() -> Program {
        let block = BasicBlock { instructions: vec![Instruction { id: InstrId(0), kind: InstrKind::Return { value: None } }] };
        let func = Function { name: "main".into(), arity: 0, blocks: vec![block] };
        Program::build(vec![func], Vec::new(), "main")
    }

    #[test]
    fn new_state_has_exactly_thread_zero_running() {
        let program = tiny_program();
        let state = State::new(&program);
        assert_eq!(state.enabled_threads(), vec![0]);
    }

    #[test]
    fn mutex_lock_then_second_locker_must_wait() {
        let program = tiny_program();
        let mut state = State::new(&program);
        let obj = ObjectId(0);
        state.mutex_init(obj);
        assert!(state.mutex_lock(obj, 0));
        assert!(!state.mutex_lock(obj, 1));
    }

    #[test]
    fn unlock_wakes_waiting_threads() {
        let program = tiny_program();
        let mut state = State::new(&program);
        let obj = ObjectId(0);
        state.mutex_init(obj);
        state.spawn_thread(FuncId(0), Vec::new(), Pc::at_block(FuncId(0), crate::ir::BlockId(0)));
        state.mutex_lock(obj, 0);
        state.mutex_wait(obj, 1);
        assert_eq!(state.thread(1).status, ThreadStatus::Paused);
        state.mutex_unlock(obj);
        assert_eq!(state.thread(1).status, ThreadStatus::Running);
    }

    #[test]
    fn join_on_already_exited_thread_returns_value_immediately() {
        let program = tiny_program();
        let mut state = State::new(&program);
        state.exit_thread(0, Value::bv(7, 32));
        let other_tid = state.spawn_thread(FuncId(0), Vec::new(), Pc::at_block(FuncId(0), crate::ir::BlockId(0)));
        assert_eq!(state.join(0, other_tid), Some(Value::bv(7, 32)));
    }

    #[test]
    fn deadlock_requires_at_least_one_surviving_thread() {
        let program = tiny_program();
        let mut state = State::new(&program);
        assert!(!state.is_deadlocked());
        state.pause(0);
        assert!(state.is_deadlocked());
    }
}
