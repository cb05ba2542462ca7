//! The causality/race trace (§4.3): an append-only sequence of actions with
//! an incrementally maintained happens-before relation, a per-position race
//! set, and per-prefix backtrack bookkeeping. The SDPOR driver is the only
//! caller; the trace itself knows nothing about scheduling.

use std::collections::BTreeSet;

use crate::ir::{Instruction, ObjectId, Tid};

/// Facts about an appended action that the trace's dependency rules need but
/// that don't live on the bare `Instruction` — whether a mutex_lock call
/// actually acquired the lock, which object a Load/Store touched, etc. The
/// driver computes these by consulting the state the action executed
/// against (see `driver::classify_action`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFact {
    Store { object: ObjectId, offset: u32 },
    Load { object: ObjectId, offset: u32 },
    MutexLockSucceeded { mutex: ObjectId },
    MutexLockFailed,
    Spawn { new_tid: Tid },
    JoinOf { target: Tid },
    ReturnOutermost,
    Other,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub tid: Tid,
    pub occurrence: u32,
    pub instr: Instruction,
    pub fact: ActionFact,
    pub causes: Vec<usize>,
    pub caused_by: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Trace {
    actions: Vec<Action>,
    racist: Vec<Vec<usize>>,
    backtrack: Vec<BTreeSet<Tid>>,
    pub data_race: bool,
}

impl Trace {
    pub fn new() -> Trace {
        Trace { actions: Vec::new(), racist: Vec::new(), backtrack: vec![BTreeSet::new()], data_race: false }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn action(&self, idx: usize) -> &Action {
        &self.actions[idx]
    }

    pub fn racist_at(&self, idx: usize) -> &[usize] {
        &self.racist[idx]
    }

    pub fn backtrack_at(&self, prefix_len: usize) -> &BTreeSet<Tid> {
        &self.backtrack[prefix_len]
    }

    pub fn backtrack_at_mut(&mut self, prefix_len: usize) -> &mut BTreeSet<Tid> {
        &mut self.backtrack[prefix_len]
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if !self.actions[from].causes.contains(&to) {
            self.actions[from].causes.push(to);
        }
        if !self.actions[to].caused_by.contains(&from) {
            self.actions[to].caused_by.push(from);
        }
    }

    /// DFS over immediate `causes` edges — computed on demand, per the
    /// design notes, rather than maintained incrementally.
    pub fn causes_star(&self, idx: usize) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![idx];
        while let Some(cur) = stack.pop() {
            for &next in &self.actions[cur].causes {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    }

    pub fn caused_by_star(&self, idx: usize) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![idx];
        while let Some(cur) = stack.pop() {
            for &prev in &self.actions[cur].caused_by {
                if seen.insert(prev) {
                    stack.push(prev);
                }
            }
        }
        seen
    }

    fn is_causal_ancestor(&self, candidate: usize, of: usize) -> bool {
        self.causes_star(candidate).contains(&of)
    }

    /// Appends `(tid, instr)` with its derived `fact`, computing
    /// happens-before edges against every earlier action and, when a race is
    /// found, recording it in `racist[idx]`. Returns the new action's
    /// position and whether this append raised a fresh race.
    pub fn append(&mut self, tid: Tid, instr: Instruction, fact: ActionFact) -> (usize, bool) {
        let occurrence = self.actions.iter().rev().find(|a| a.tid == tid).map(|a| a.occurrence + 1).unwrap_or(1);
        let idx = self.actions.len();
        self.actions.push(Action { tid, occurrence, instr, fact, causes: Vec::new(), caused_by: Vec::new() });
        self.racist.push(Vec::new());
        self.backtrack.push(BTreeSet::new());

        let mut raced = false;
        for j in (0..idx).rev() {
            if self.relate(j, idx) {
                raced = true;
            }
        }
        if raced {
            self.data_race = true;
        }
        (idx, raced)
    }

    /// Applies the first matching dependency rule between earlier action `j`
    /// and the just-appended action `idx`. Returns true if this pair was
    /// recorded as a race.
    fn relate(&mut self, j: usize, idx: usize) -> bool {
        let f_tid = self.actions[j].tid;
        let f_occurrence = self.actions[j].occurrence;
        let e_tid = self.actions[idx].tid;
        let e_occurrence = self.actions[idx].occurrence;

        if f_tid == e_tid && f_occurrence + 1 == e_occurrence {
            self.add_edge(j, idx);
            return false;
        }

        if self.data_race_dependency(j, idx) {
            let already_ancestor = self.is_causal_ancestor(j, idx);
            self.add_edge(j, idx);
            if !already_ancestor {
                self.racist[idx].push(j);
                return true;
            }
            return false;
        }

        if let (ActionFact::MutexLockSucceeded { mutex: m1 }, ActionFact::MutexLockSucceeded { mutex: m2 }) =
            (&self.actions[j].fact, &self.actions[idx].fact)
        {
            if m1 == m2 {
                self.add_edge(j, idx);
                self.racist[idx].push(j);
                return true;
            }
        }

        if self.unlock_then_next_lock(j, idx) || self.fork_then_first_step(j, idx) || self.return_then_post_join(j, idx) {
            self.add_edge(j, idx);
            return false;
        }

        false
    }

    fn data_race_dependency(&self, j: usize, idx: usize) -> bool {
        if self.actions[j].tid == self.actions[idx].tid {
            return false;
        }
        let loc = |fact: &ActionFact| match fact {
            ActionFact::Store { object, offset } | ActionFact::Load { object, offset } => Some((*object, *offset)),
            _ => None,
        };
        let is_store = |fact: &ActionFact| matches!(fact, ActionFact::Store { .. });
        let (Some(loc_j), Some(loc_e)) = (loc(&self.actions[j].fact), loc(&self.actions[idx].fact)) else {
            return false;
        };
        if loc_j != loc_e {
            return false;
        }
        is_store(&self.actions[j].fact) || is_store(&self.actions[idx].fact)
    }

    fn unlock_then_next_lock(&self, j: usize, idx: usize) -> bool {
        let e_tid = self.actions[idx].tid;
        let e_occurrence = self.actions[idx].occurrence;
        // f must itself be an unlock; we don't model unlock as a distinct
        // ActionFact variant, so fall back to instruction inspection.
        let f_is_unlock = is_mutex_unlock(&self.actions[j].instr);
        if !f_is_unlock {
            return false;
        }
        self.actions.iter().enumerate().any(|(k, a)| {
            k > j
                && k < idx
                && a.tid == e_tid
                && a.occurrence + 1 == e_occurrence
                && matches!(a.fact, ActionFact::MutexLockSucceeded { .. })
        })
    }

    fn fork_then_first_step(&self, j: usize, idx: usize) -> bool {
        matches!(&self.actions[j].fact, ActionFact::Spawn { new_tid } if *new_tid == self.actions[idx].tid) && self.actions[idx].occurrence == 1
    }

    fn return_then_post_join(&self, j: usize, idx: usize) -> bool {
        if !matches!(self.actions[j].fact, ActionFact::ReturnOutermost) {
            return false;
        }
        let f_tid = self.actions[j].tid;
        let e_tid = self.actions[idx].tid;
        let e_occurrence = self.actions[idx].occurrence;
        self.actions.iter().enumerate().any(|(k, a)| {
            k > j
                && k < idx
                && a.tid == e_tid
                && a.occurrence + 1 == e_occurrence
                && matches!(&a.fact, ActionFact::JoinOf { target } if *target == f_tid)
        })
    }

    /// Removes the tail action, unlinking it from every predecessor's
    /// `causes` list, and pops its racist/backtrack slots.
    pub fn trim(&mut self) {
        let idx = self.actions.len() - 1;
        let caused_by = self.actions[idx].caused_by.clone();
        for f in caused_by {
            self.actions[f].causes.retain(|&c| c != idx);
        }
        self.actions.pop();
        self.racist.pop();
        self.backtrack.pop();
    }

    pub fn add_to_prefix_backtrack(&mut self, action_idx: usize, tid: Tid) {
        self.backtrack[action_idx].insert(tid);
    }

    /// Speculatively appends a hypothetical `(tid, instr, fact)` action and
    /// reports whether it would be found dependent on the current tail
    /// action — same-thread adjacency, data-race, lock-race, or one of the
    /// non-reversible causalities all register as an edge in `relate`, so
    /// this is exactly the driver's `dependent_with_last` predicate (§4.4).
    /// The speculative action is appended and trimmed before returning, so
    /// the trace is left exactly as it was found.
    pub fn would_depend_on_tail(&mut self, tid: Tid, instr: Instruction, fact: ActionFact) -> bool {
        if self.actions.is_empty() {
            return false;
        }
        let tail = self.actions.len() - 1;
        let (idx, _) = self.append(tid, instr, fact);
        let depends = self.actions[idx].caused_by.contains(&tail);
        self.trim();
        depends
    }

    /// Threads from which the driver may pick a new backtrack candidate to
    /// reverse the race detected between `e` (the racing earlier action) and
    /// the trace's tail.
    pub fn independent_suffix_set(&self, e: usize) -> BTreeSet<Tid> {
        let ancestors = self.causes_star(e);
        let last = self.actions.len() - 1;
        let suffix: BTreeSet<usize> = ((e + 1)..=last).filter(|i| !ancestors.contains(i)).collect();
        suffix
            .iter()
            .filter(|&&f| self.caused_by_star(f).intersection(&suffix).next().is_none())
            .map(|&f| self.actions[f].tid)
            .collect()
    }
}

fn is_mutex_unlock(instr: &Instruction) -> bool {
    matches!(&instr.kind, crate::ir::InstrKind::Call { callee, .. } if callee == "pthread_mutex_unlock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstrId, InstrKind, Operand, Value};

    fn dummy_instr(id: u32) -> Instruction {
        Instruction { id: InstrId(id), kind: InstrKind::Return { value: None } }
    }

    #[test]
    fn same_thread_successive_actions_are_causally_ordered_not_raced() {
        let mut trace = Trace::new();
        trace.append(0, dummy_instr(0), ActionFact::Other);
        let (_, raced) = trace.append(0, dummy_instr(1), ActionFact::Other);
        assert!(!raced);
        assert!(trace.causes_star(0).contains(&1));
    }

    #[test]
    fn write_write_race_on_same_object_is_recorded() {
        let mut trace = Trace::new();
        let object = ObjectId(0);
        trace.append(0, dummy_instr(0), ActionFact::Store { object, offset: 0 });
        let (idx, raced) = trace.append(1, dummy_instr(1), ActionFact::Store { object, offset: 0 });
        assert!(raced);
        assert_eq!(trace.racist_at(idx), &[0]);
        assert!(trace.data_race);
    }

    #[test]
    fn lock_protected_writes_are_ordered_not_raced() {
        let mtx = ObjectId(0);
        let g = ObjectId(1);
        let mut trace = Trace::new();
        // T0: lock(m); g = tid
        trace.append(0, dummy_instr(0), ActionFact::MutexLockSucceeded { mutex: mtx });
        trace.append(0, dummy_instr(1), ActionFact::Store { object: g, offset: 0 });
        let unlock_instr = Instruction {
            id: InstrId(2),
            kind: InstrKind::Call { callee: "pthread_mutex_unlock".into(), args: vec![Operand::Const(Value::bv(0, 64))] },
        };
        trace.append(0, unlock_instr, ActionFact::Other);
        // T1: lock(m); g = tid
        let (lock_idx, raced_lock) = trace.append(1, dummy_instr(3), ActionFact::MutexLockSucceeded { mutex: mtx });
        assert!(raced_lock);
        let (store_idx, raced_store) = trace.append(1, dummy_instr(4), ActionFact::Store { object: g, offset: 0 });
        assert!(!raced_store, "store is ordered via lock causality, not a fresh race");
        assert!(trace.causes_star(2).contains(&lock_idx));
        assert!(trace.causes_star(0).contains(&store_idx) || trace.causes_star(1).contains(&store_idx));
    }

    #[test]
    fn trim_restores_predecessor_causes_list() {
        let mut trace = Trace::new();
        trace.append(0, dummy_instr(0), ActionFact::Other);
        trace.append(0, dummy_instr(1), ActionFact::Other);
        assert!(trace.action(0).causes.contains(&1));
        trace.trim();
        assert!(!trace.action(0).causes.contains(&1));
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn fork_edges_first_step_of_spawned_thread() {
        let mut trace = Trace::new();
        trace.append(0, dummy_instr(0), ActionFact::Spawn { new_tid: 1 });
        let (_, raced) = trace.append(1, dummy_instr(1), ActionFact::Other);
        assert!(!raced);
        assert!(trace.causes_star(0).contains(&1));
    }

    #[test]
    fn would_depend_on_tail_reports_without_mutating_the_trace() {
        let object = ObjectId(0);
        let mut trace = Trace::new();
        trace.append(0, dummy_instr(0), ActionFact::Store { object, offset: 0 });
        let before = trace.len();
        let dependent = trace.would_depend_on_tail(1, dummy_instr(1), ActionFact::Store { object, offset: 0 });
        assert!(dependent);
        assert_eq!(trace.len(), before);

        let independent = trace.would_depend_on_tail(1, dummy_instr(2), ActionFact::Other);
        assert!(!independent);
        assert_eq!(trace.len(), before);
    }
}
