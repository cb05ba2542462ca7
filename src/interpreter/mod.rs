//! The single-step symbolic interpreter (§4.2): advances exactly one
//! thread's next instruction and returns the resulting successor states. It
//! holds no scheduling state of its own — it is a pure function of
//! `(&Program, &State, Tid)` — so the SDPOR driver is free to call it for
//! any enabled thread in any order.

use crate::ir::program::Pc;
use crate::ir::{BlockId, CmpPredicate, Concrete, Instruction, InstrKind, ObjectId, Operand, Program, Tid, Ty, UnaryFloatOp, Value};
use crate::memory::MemoryModel;
use crate::solver::{SatResult, Solver};
use crate::state::thread::Frame;
use crate::state::{ErrorKind, MemoryErrorKind, State, StateStatus};
use crate::trace::ActionFact;

/// Names the interpreter recognizes without consulting `Program` — the
/// threading, locking, and atomic-region primitives plus the small set of
/// runtime functions the reference programs call directly.
const RECOGNIZED_RUNTIME_FUNCTIONS: &[&str] = &[
    "pthread_mutex_init",
    "pthread_mutex_destroy",
    "pthread_mutex_lock",
    "pthread_mutex_unlock",
    "__VERIFIER_atomic_begin",
    "__VERIFIER_atomic_end",
    "__VERIFIER_assume",
    "__assert_fail",
    "abort",
];

pub struct StepOutcome {
    pub successors: Vec<State>,
    pub executed: Instruction,
}

pub fn step(program: &Program, state: &State, tid: Tid, solver: &dyn Solver, pointer_bitwidth: u32) -> StepOutcome {
    let thread = state.thread(tid);
    let pc = thread.pc;
    let instr = program
        .instruction_at(pc)
        .unwrap_or_else(|| panic!("thread {tid} pc {pc:?} does not name a live instruction"))
        .clone();

    let successors = execute(program, state, tid, &instr, solver, pointer_bitwidth);
    StepOutcome { successors, executed: instr }
}

fn eval_operand(state: &State, tid: Tid, operand: &Operand) -> Value {
    match operand {
        Operand::Const(v) => v.clone(),
        Operand::Instr(id) => state
            .thread(tid)
            .current_frame()
            .locals
            .get(id)
            .unwrap_or_else(|| panic!("instruction {id:?} has no bound result yet"))
            .clone(),
        Operand::Arg(index) => state.thread(tid).current_frame().args[*index as usize].clone(),
        Operand::Global(id) => {
            let object = state.global_objects[id.0 as usize];
            Value::pointer(object, Value::bv(0, 64))
        }
    }
}

fn bind(state: &mut State, tid: Tid, id: crate::ir::InstrId, value: Value) {
    state.thread_mut(tid).current_frame_mut().locals.insert(id, value);
}

fn advance(state: &mut State, tid: Tid) {
    let next = state.thread(tid).pc.next();
    state.thread_mut(tid).pc = next;
}

fn object_and_offset(value: &Value) -> Option<(ObjectId, u32)> {
    match value {
        Value::Concrete(Concrete::Pointer { object, offset }) => offset.as_concrete_bv().map(|o| (*object, o as u32)),
        _ => None,
    }
}

fn kill(mut state: State, reason: impl Into<String>) -> State {
    state.status = StateStatus::Killed(reason.into());
    state
}

fn memory_error_state(mut state: State, kind: MemoryErrorKind) -> State {
    state.status = StateStatus::Error(ErrorKind::Memory(kind));
    state
}

/// Boundary behavior (§8): "Empty enabled set after all threads exited:
/// state classified Exited(0)." Called from every path that may empty the
/// thread map, so the driver can read the classification off `state.status`
/// instead of re-deriving it from `is_fully_exited()`.
fn mark_fully_exited(state: &mut State) {
    if state.is_fully_exited() {
        state.status = StateStatus::Exited(0);
    }
}

fn execute(program: &Program, state: &State, tid: Tid, instr: &Instruction, solver: &dyn Solver, pointer_bitwidth: u32) -> Vec<State> {
    match &instr.kind {
        InstrKind::Alloc { size, is_global, zeroed } => {
            let mut next = state.clone();
            let size_val = eval_operand(&next, tid, size);
            match size_val.as_concrete_bv() {
                Some(size_bytes) => {
                    let object = next.memory.allocate(size_bytes as u32, *is_global, *zeroed);
                    bind(&mut next, tid, instr.id, Value::pointer(object, Value::bv(0, pointer_bitwidth)));
                    advance(&mut next, tid);
                    vec![next]
                }
                None => vec![kill(next, "symbolic-sized allocation is not supported")],
            }
        }
        InstrKind::GlobalVariable(global_id) => {
            let mut next = state.clone();
            let object = next.global_objects[global_id.0 as usize];
            bind(&mut next, tid, instr.id, Value::pointer(object, Value::bv(0, pointer_bitwidth)));
            advance(&mut next, tid);
            vec![next]
        }
        InstrKind::Load { ptr, ty } => {
            let mut next = state.clone();
            let ptr_val = eval_operand(&next, tid, ptr);
            let Some((object, offset)) = object_and_offset(&ptr_val) else {
                return vec![kill(next, "load from a non-constant or non-pointer address is not supported")];
            };
            let bytes = (ty.bit_width(pointer_bitwidth) + 7) / 8;
            match next.memory.read(object, offset, bytes) {
                Ok(val) => {
                    bind(&mut next, tid, instr.id, val);
                    advance(&mut next, tid);
                    vec![next]
                }
                Err(crate::memory::MemoryError::UninitRead { .. }) => {
                    let fresh = Value::symbolic(format!("uninit_{}_{}", tid, instr.id.0), *ty);
                    if next.memory.write(object, offset, bytes, fresh.clone()).is_err() {
                        return vec![memory_error_state(next, MemoryErrorKind::Unsupported)];
                    }
                    bind(&mut next, tid, instr.id, fresh);
                    advance(&mut next, tid);
                    vec![next]
                }
                Err(crate::memory::MemoryError::OutOfBounds { .. }) => vec![memory_error_state(next, MemoryErrorKind::OutOfBounds)],
                Err(crate::memory::MemoryError::Unsupported(_)) => vec![memory_error_state(next, MemoryErrorKind::Unsupported)],
            }
        }
        InstrKind::Store { ptr, value } => {
            let mut next = state.clone();
            let ptr_val = eval_operand(&next, tid, ptr);
            let val = eval_operand(&next, tid, value);
            let Some((object, offset)) = object_and_offset(&ptr_val) else {
                return vec![kill(next, "store to a non-constant or non-pointer address is not supported")];
            };
            let bytes = (val.ty(pointer_bitwidth).bit_width(pointer_bitwidth) + 7) / 8;
            match next.memory.write(object, offset, bytes, val) {
                Ok(()) => {
                    advance(&mut next, tid);
                    vec![next]
                }
                Err(crate::memory::MemoryError::OutOfBounds { .. }) => vec![memory_error_state(next, MemoryErrorKind::OutOfBounds)],
                Err(_) => vec![memory_error_state(next, MemoryErrorKind::Unsupported)],
            }
        }
        InstrKind::BinaryOp { op, width, lhs, rhs } => {
            let mut next = state.clone();
            let l = eval_operand(&next, tid, lhs);
            let r = eval_operand(&next, tid, rhs);
            bind(&mut next, tid, instr.id, Value::bin_op(*op, *width, l, r));
            advance(&mut next, tid);
            vec![next]
        }
        InstrKind::Cmp { predicate, unsigned_or_unordered, lhs, rhs } => {
            let mut next = state.clone();
            let l = eval_operand(&next, tid, lhs);
            let r = eval_operand(&next, tid, rhs);
            bind(&mut next, tid, instr.id, Value::cmp(*predicate, *unsigned_or_unordered, l, r));
            advance(&mut next, tid);
            vec![next]
        }
        InstrKind::Branch { cond, then_block, else_block } => match cond {
            None => vec![jump(state, tid, *then_block)],
            Some(cond) => {
                let cond_val = eval_operand(state, tid, cond);
                match cond_val.as_concrete_bool() {
                    Some(true) => vec![jump(state, tid, *then_block)],
                    Some(false) => vec![jump(state, tid, else_block.expect("conditional branch has an else target"))],
                    None => fork_branch(state, tid, &cond_val, *then_block, else_block.expect("conditional branch has an else target"), solver),
                }
            }
        },
        InstrKind::Switch { value, cases, default } => {
            let val = eval_operand(state, tid, value);
            match val.as_concrete_bv() {
                Some(v) => {
                    let target = cases.iter().find(|(c, _)| *c == v).map(|(_, b)| *b).unwrap_or(*default);
                    vec![jump(state, tid, target)]
                }
                None => {
                    let mut out = Vec::new();
                    for (c, block) in cases {
                        let eq = Value::cmp(CmpPredicate::Eq, false, val.clone(), Value::bv(*c, 64));
                        if let Some(s) = branch_if_feasible(state, tid, &eq, *block, solver) {
                            out.push(s);
                        }
                    }
                    out.push(jump(state, tid, *default));
                    out
                }
            }
        }
        InstrKind::Assume { conds } => {
            let mut next = state.clone();
            for cond in conds {
                let v = eval_operand(&next, tid, cond);
                next.path_condition.push(v);
            }
            if solver.check_sat(&next.path_condition, &[]) == SatResult::Unsat {
                vec![]
            } else {
                advance(&mut next, tid);
                vec![next]
            }
        }
        InstrKind::Assert { cond } => {
            let cond_val = eval_operand(state, tid, cond);
            let not_cond = Value::not(cond_val.clone());
            let mut out = Vec::new();
            if solver.check_sat(&state.path_condition, &[not_cond.clone()]) != SatResult::Unsat {
                let mut failing = state.clone();
                failing.path_condition.push(not_cond);
                failing.status = StateStatus::Error(ErrorKind::Assertion);
                out.push(failing);
            }
            if solver.check_sat(&state.path_condition, &[cond_val.clone()]) != SatResult::Unsat {
                let mut holding = state.clone();
                holding.path_condition.push(cond_val);
                advance(&mut holding, tid);
                out.push(holding);
            }
            out
        }
        InstrKind::Call { callee, args } => execute_call(program, state, tid, instr, callee, args),
        InstrKind::Return { value } => {
            let mut next = state.clone();
            let retval = value.as_ref().map(|v| eval_operand(&next, tid, v));
            return_from_frame(&mut next, tid, retval);
            vec![next]
        }
        InstrKind::Thread { function, args } => {
            let mut next = state.clone();
            let evaluated: Vec<Value> = args.iter().map(|a| eval_operand(&next, tid, a)).collect();
            match program.func_by_name(function) {
                Some(func_id) => {
                    let pc = Pc::at_block(func_id, program.func(func_id).entry_block());
                    let new_tid = next.spawn_thread(func_id, evaluated, pc);
                    bind(&mut next, tid, instr.id, Value::bv(new_tid as u128, pointer_bitwidth));
                    advance(&mut next, tid);
                    vec![next]
                }
                None => vec![kill(next, format!("spawning thread with undefined function: {function}"))],
            }
        }
        InstrKind::ThreadJoin { tid: target } => {
            let mut next = state.clone();
            let target_val = eval_operand(&next, tid, target);
            match target_val.as_concrete_bv() {
                None => vec![kill(next, "symbolic thread ids are not supported")],
                Some(target_tid) => match next.join(target_tid as Tid, tid) {
                    Some(retval) => {
                        bind(&mut next, tid, instr.id, retval);
                        advance(&mut next, tid);
                        vec![next]
                    }
                    None => vec![next],
                },
            }
        }
        InstrKind::ThreadExit { value } => {
            let mut next = state.clone();
            let retval = value.as_ref().map(|v| eval_operand(&next, tid, v)).unwrap_or(Value::bv(0, 32));
            next.exit_thread(tid, retval);
            mark_fully_exited(&mut next);
            vec![next]
        }
        InstrKind::Cast { ty, operand } => {
            let mut next = state.clone();
            let v = eval_operand(&next, tid, operand);
            let casted = match v.as_concrete_bv() {
                Some(bits) => Value::bv(bits, ty.bit_width(pointer_bitwidth)),
                None => v,
            };
            bind(&mut next, tid, instr.id, casted);
            advance(&mut next, tid);
            vec![next]
        }
        InstrKind::Extend { signed: _, width, operand } => {
            let mut next = state.clone();
            let v = eval_operand(&next, tid, operand);
            let extended = match v.as_concrete_bv() {
                Some(bits) => Value::bv(bits, *width),
                None => v,
            };
            bind(&mut next, tid, instr.id, extended);
            advance(&mut next, tid);
            vec![next]
        }
        InstrKind::Extract { lo, hi, operand } => {
            let (lo, hi) = (*lo, *hi);
            let mut next = state.clone();
            let v = eval_operand(&next, tid, operand);
            let extracted = match v.as_concrete_bv() {
                Some(bits) => Value::bv((bits >> lo) & ((1u128 << (hi - lo + 1)) - 1), hi - lo + 1),
                None => v,
            };
            bind(&mut next, tid, instr.id, extracted);
            advance(&mut next, tid);
            vec![next]
        }
        InstrKind::Ite { cond, then_val, else_val, ty } => {
            let mut next = state.clone();
            let c = eval_operand(&next, tid, cond);
            let t = eval_operand(&next, tid, then_val);
            let e = eval_operand(&next, tid, else_val);
            bind(&mut next, tid, instr.id, Value::ite(c, t, e, *ty));
            advance(&mut next, tid);
            vec![next]
        }
        InstrKind::UnaryFloatOp { op, operand } => {
            let mut next = state.clone();
            let v = eval_operand(&next, tid, operand);
            bind(&mut next, tid, instr.id, Value::unary_float_op(*op, v));
            advance(&mut next, tid);
            vec![next]
        }
    }
}

/// Derives the `ActionFact` the trace needs for `instr`, evaluated against
/// `pre` (the state the instruction executed against) and `post` (the
/// successor the driver chose to recurse into). The interpreter is the only
/// place that knows how to resolve an operand to an object/offset pair, so
/// the trace asks here rather than re-implementing pointer resolution.
pub fn classify_action(pre: &State, tid: Tid, instr: &Instruction, post: &State) -> ActionFact {
    match &instr.kind {
        InstrKind::Store { ptr, .. } => match object_and_offset(&eval_operand(pre, tid, ptr)) {
            Some((object, offset)) => ActionFact::Store { object, offset },
            None => ActionFact::Other,
        },
        InstrKind::Load { ptr, .. } => match object_and_offset(&eval_operand(pre, tid, ptr)) {
            Some((object, offset)) => ActionFact::Load { object, offset },
            None => ActionFact::Other,
        },
        InstrKind::Call { callee, args } if callee == "pthread_mutex_lock" => {
            match object_and_offset(&eval_operand(pre, tid, &args[0])) {
                Some((object, _)) if post.mutex_locked_by(object) == Some(tid) => {
                    ActionFact::MutexLockSucceeded { mutex: object }
                }
                Some(_) => ActionFact::MutexLockFailed,
                None => ActionFact::Other,
            }
        }
        InstrKind::Thread { .. } => post
            .thread(tid)
            .current_frame()
            .locals
            .get(&instr.id)
            .and_then(Value::as_concrete_bv)
            .map(|new_tid| ActionFact::Spawn { new_tid: new_tid as Tid })
            .unwrap_or(ActionFact::Other),
        InstrKind::ThreadJoin { tid: target } => match eval_operand(pre, tid, target).as_concrete_bv() {
            Some(t) => ActionFact::JoinOf { target: t as Tid },
            None => ActionFact::Other,
        },
        InstrKind::Return { .. } | InstrKind::ThreadExit { .. } => {
            if post.exited_threads.contains_key(&tid) && !post.threads.contains_key(&tid) {
                ActionFact::ReturnOutermost
            } else {
                ActionFact::Other
            }
        }
        _ => ActionFact::Other,
    }
}

fn jump(state: &State, tid: Tid, block: BlockId) -> State {
    let mut next = state.clone();
    let func = next.thread(tid).current_frame().function;
    next.thread_mut(tid).pc = Pc::at_block(func, block);
    next
}

fn fork_branch(state: &State, tid: Tid, cond: &Value, then_block: BlockId, else_block: BlockId, solver: &dyn Solver) -> Vec<State> {
    let mut out = Vec::new();
    if let Some(s) = branch_if_feasible(state, tid, cond, then_block, solver) {
        out.push(s);
    }
    let not_cond = Value::not(cond.clone());
    if let Some(s) = branch_if_feasible(state, tid, &not_cond, else_block, solver) {
        out.push(s);
    }
    out
}

fn branch_if_feasible(state: &State, tid: Tid, cond: &Value, target: BlockId, solver: &dyn Solver) -> Option<State> {
    if solver.check_sat(&state.path_condition, &[cond.clone()]) == SatResult::Unsat {
        return None;
    }
    let mut next = jump(state, tid, target);
    next.path_condition.push(cond.clone());
    Some(next)
}

fn return_from_frame(state: &mut State, tid: Tid, retval: Option<Value>) {
    let thread = state.thread_mut(tid);
    let popped = thread.call_stack.pop().expect("return always pops a live frame");
    if thread.call_stack.is_empty() {
        let value = retval.unwrap_or(Value::bv(0, 32));
        state.exit_thread(tid, value);
        mark_fully_exited(state);
        return;
    }
    let resume_pc = popped.return_pc.expect("a non-outermost frame always has a resume site");
    if let (Some(dest), Some(value)) = (popped.dest, retval) {
        state.thread_mut(tid).current_frame_mut().locals.insert(dest, value);
    }
    state.thread_mut(tid).pc = resume_pc;
}

fn execute_call(program: &Program, state: &State, tid: Tid, instr: &Instruction, callee: &str, args: &[Operand]) -> Vec<State> {
    if RECOGNIZED_RUNTIME_FUNCTIONS.contains(&callee) {
        return execute_runtime_call(state, tid, instr, callee, args);
    }
    let mut next = state.clone();
    if let Some(func_id) = program.func_by_name(callee) {
        let evaluated: Vec<Value> = args.iter().map(|a| eval_operand(&next, tid, a)).collect();
        let return_pc = next.thread(tid).pc.next();
        let frame = Frame::new(func_id, evaluated, Some(return_pc), Some(instr.id));
        let entry = Pc::at_block(func_id, program.func(func_id).entry_block());
        let thread = next.thread_mut(tid);
        thread.call_stack.push(frame);
        thread.pc = entry;
        return vec![next];
    }
    if callee.starts_with("pthread_") {
        return vec![kill(next, format!("unsupported pthread_* API: {callee}"))];
    }
    let fresh = Value::symbolic(format!("undef_{}_{}", callee, instr.id.0), Ty::BitVec(64));
    bind(&mut next, tid, instr.id, fresh);
    advance(&mut next, tid);
    vec![next]
}

fn execute_runtime_call(state: &State, tid: Tid, instr: &Instruction, callee: &str, args: &[Operand]) -> Vec<State> {
    let mut next = state.clone();
    match callee {
        "__VERIFIER_atomic_begin" => {
            if next.thread(tid).in_atomic {
                return vec![kill(next, "nested atomic regions are not supported")];
            }
            next.thread_mut(tid).in_atomic = true;
            advance(&mut next, tid);
            vec![next]
        }
        "__VERIFIER_atomic_end" => {
            if !next.thread(tid).in_atomic {
                return vec![kill(next, "atomic_end without a matching atomic_begin")];
            }
            next.thread_mut(tid).in_atomic = false;
            advance(&mut next, tid);
            vec![next]
        }
        "pthread_mutex_init" => {
            let ptr = eval_operand(&next, tid, &args[0]);
            match object_and_offset(&ptr) {
                Some((object, _)) => {
                    next.mutex_init(object);
                    bind(&mut next, tid, instr.id, Value::bv(0, 32));
                    advance(&mut next, tid);
                    vec![next]
                }
                None => vec![kill(next, "mutex operand did not resolve to an object")],
            }
        }
        "pthread_mutex_destroy" => {
            let ptr = eval_operand(&next, tid, &args[0]);
            match object_and_offset(&ptr) {
                Some((object, _)) => {
                    next.mutex_destroy(object);
                    bind(&mut next, tid, instr.id, Value::bv(0, 32));
                    advance(&mut next, tid);
                    vec![next]
                }
                None => vec![kill(next, "mutex operand did not resolve to an object")],
            }
        }
        "pthread_mutex_lock" => {
            let ptr = eval_operand(&next, tid, &args[0]);
            let Some((object, _)) = object_and_offset(&ptr) else {
                return vec![kill(next, "mutex operand did not resolve to an object")];
            };
            match next.mutex_locked_by(object) {
                Some(owner) if owner == tid => vec![kill(next, "double lock")],
                Some(_) => {
                    next.mutex_wait(object, tid);
                    vec![next]
                }
                None => {
                    next.mutex_lock(object, tid);
                    advance(&mut next, tid);
                    vec![next]
                }
            }
        }
        "pthread_mutex_unlock" => {
            let ptr = eval_operand(&next, tid, &args[0]);
            let Some((object, _)) = object_and_offset(&ptr) else {
                return vec![kill(next, "mutex operand did not resolve to an object")];
            };
            if !next.has_mutex(object) {
                return vec![kill(next, "unlocking unknown mutex")];
            }
            match next.mutex_locked_by(object) {
                Some(owner) if owner == tid => {
                    next.mutex_unlock(object);
                    advance(&mut next, tid);
                    vec![next]
                }
                Some(_) => vec![kill(next, "unlocking un-owned mutex")],
                None => vec![kill(next, "unlocking an already-unlocked mutex")],
            }
        }
        "__VERIFIER_assume" => {
            for arg in args {
                let v = eval_operand(&next, tid, arg);
                next.path_condition.push(v);
            }
            advance(&mut next, tid);
            vec![next]
        }
        "__assert_fail" => {
            next.status = StateStatus::Error(ErrorKind::Assertion);
            vec![next]
        }
        "abort" => {
            next.status = StateStatus::Terminated("abort() called".into());
            vec![next]
        }
        other => vec![kill(next, format!("unrecognized runtime function: {other}"))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::program::{BasicBlock, Function, Global};
    use crate::ir::value::BinOp;
    use crate::ir::{GlobalId, InstrId};
    use crate::solver::ReferenceSolver;

    fn program_with_global_store() -> Program {
        let block = BasicBlock {
            instructions: vec![
                Instruction { id: InstrId(0), kind: InstrKind::GlobalVariable(GlobalId(0)) },
                Instruction {
                    id: InstrId(1),
                    kind: InstrKind::Store { ptr: Operand::Instr(InstrId(0)), value: Operand::Const(Value::bv(1, 32)) },
                },
                Instruction { id: InstrId(2), kind: InstrKind::Return { value: None } },
            ],
        };
        let func = Function { name: "main".into(), arity: 0, blocks: vec![block] };
        let global = Global { name: "g".into(), zeroed: true, init: Vec::new(), size_bytes: 4 };
        Program::build(vec![func], vec![global], "main")
    }

    fn prepare(program: &Program) -> State {
        let mut state = State::new(program);
        state.run_globals(program);
        state
    }

    #[test]
    fn store_to_global_advances_pc_and_writes_through_memory() {
        let program = program_with_global_store();
        let state = prepare(&program);
        let solver = ReferenceSolver::new();
        let outcome = step(&program, &state, 0, &solver, 64);
        assert_eq!(outcome.successors.len(), 1);
        let next = &outcome.successors[0];
        assert_eq!(next.memory.read(next.global_objects[0], 0, 4).unwrap(), Value::bv(1, 32));
    }

    #[test]
    fn binary_op_folds_concrete_operands() {
        let block = BasicBlock {
            instructions: vec![
                Instruction {
                    id: InstrId(0),
                    kind: InstrKind::BinaryOp { op: BinOp::Add, width: 32, lhs: Operand::Const(Value::bv(1, 32)), rhs: Operand::Const(Value::bv(2, 32)) },
                },
                Instruction { id: InstrId(1), kind: InstrKind::Return { value: Some(Operand::Instr(InstrId(0))) } },
            ],
        };
        let func = Function { name: "main".into(), arity: 0, blocks: vec![block] };
        let program = Program::build(vec![func], Vec::new(), "main");
        let state = prepare(&program);
        let solver = ReferenceSolver::new();
        let outcome = step(&program, &state, 0, &solver, 64);
        let next = &outcome.successors[0];
        assert_eq!(next.thread(0).current_frame().locals[&InstrId(0)], Value::bv(3, 32));
    }

    #[test]
    fn unary_float_op_folds_concrete_operands() {
        use crate::ir::types::FloatWidth;
        let block = BasicBlock {
            instructions: vec![
                Instruction {
                    id: InstrId(0),
                    kind: InstrKind::UnaryFloatOp {
                        op: UnaryFloatOp::Fabs,
                        operand: Operand::Const(Value::float(-2.5, FloatWidth::F64)),
                    },
                },
                Instruction { id: InstrId(1), kind: InstrKind::Return { value: Some(Operand::Instr(InstrId(0))) } },
            ],
        };
        let func = Function { name: "main".into(), arity: 0, blocks: vec![block] };
        let program = Program::build(vec![func], Vec::new(), "main");
        let state = prepare(&program);
        let solver = ReferenceSolver::new();
        let outcome = step(&program, &state, 0, &solver, 64);
        let next = &outcome.successors[0];
        assert_eq!(next.thread(0).current_frame().locals[&InstrId(0)].as_concrete_float(), Some(2.5));
    }

    #[test]
    fn isnan_predicate_yields_a_bool() {
        use crate::ir::types::FloatWidth;
        let nan = Value::float(f64::NAN, FloatWidth::F64);
        assert_eq!(Value::unary_float_op(UnaryFloatOp::IsNan, nan).as_concrete_bool(), Some(true));
    }

    #[test]
    fn double_lock_by_owner_is_killed() {
        let block = BasicBlock {
            instructions: vec![
                Instruction { id: InstrId(0), kind: InstrKind::GlobalVariable(GlobalId(0)) },
                Instruction {
                    id: InstrId(1),
                    kind: InstrKind::Call { callee: "pthread_mutex_lock".into(), args: vec![Operand::Instr(InstrId(0))] },
                },
            ],
        };
        let func = Function { name: "main".into(), arity: 0, blocks: vec![block] };
        let global = Global { name: "m".into(), zeroed: true, init: Vec::new(), size_bytes: 8 };
        let program = Program::build(vec![func], vec![global], "main");
        let mut state = prepare(&program);
        state.mutex_init(state.global_objects[0]);
        state.mutex_lock(state.global_objects[0], 0);
        state.thread_mut(0).pc = state.thread(0).pc.next();
        let solver = ReferenceSolver::new();
        let outcome = step(&program, &state, 0, &solver, 64);
        assert!(matches!(outcome.successors[0].status, StateStatus::Killed(_)));
    }
}
