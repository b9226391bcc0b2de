//! Pending-phase queue with LIFO prepends and splice marks.
//!
//! The current phase is never stored here. The front of the queue is the
//! next phase to run. Phases the current phase places ahead of the existing
//! continuation form the *fresh* segment at the front; a splice mark taken
//! now points at the end of that segment, so appends made while the mark is
//! active land ahead of everything that was already scheduled.
//!
//! Phases deferred to the next turn wait in a separate holding queue until
//! the scheduler refills an empty queue, where they run ahead of `TurnInit`.

use super::{Phase, PhaseId, PhaseKind, PhaseName};
use crate::battle::{BattlerIndex, Command};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default)]
pub struct PhaseQueue {
    pending: VecDeque<Phase>,
    /// Stack of insertion indices; the last entry is the active mark.
    splice_marks: Vec<usize>,
    /// Phases at the front placed there by the current phase.
    fresh: usize,
    /// Held back until the next turn is populated.
    deferred: VecDeque<Phase>,
    next_id: u64,
}

impl PhaseQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&mut self, kind: PhaseKind) -> Phase {
        self.next_id = self.next_id.wrapping_add(1);
        Phase {
            id: PhaseId(self.next_id),
            kind,
        }
    }

    /// Add to the back of the continuation, or at the active splice mark.
    pub fn enqueue_append(&mut self, kind: PhaseKind) -> PhaseId {
        let phase = self.mint(kind);
        let id = phase.id;
        self.append(phase);
        id
    }

    fn append(&mut self, phase: Phase) {
        match self.splice_marks.last().copied() {
            Some(mark) => {
                let at = mark.min(self.pending.len());
                self.insert_at(at, phase);
            }
            None => self.pending.push_back(phase),
        }
    }

    /// Hold `kind` back until the queue next runs dry during a battle; it
    /// then runs ahead of that turn's `TurnInit`.
    pub fn enqueue_deferred(&mut self, kind: PhaseKind) -> PhaseId {
        let phase = self.mint(kind);
        let id = phase.id;
        self.deferred.push_back(phase);
        id
    }

    /// Queue a `Move` ahead of the first pending `Move` whose priority is
    /// lower than `priority`, or append it when none is.
    ///
    /// `priority_of` prices the pending moves.
    pub fn enqueue_move<F>(&mut self, kind: PhaseKind, priority: i8, mut priority_of: F) -> PhaseId
    where
        F: FnMut(BattlerIndex, &Command) -> i8,
    {
        let phase = self.mint(kind);
        let id = phase.id;
        let slower = self.pending.iter().position(|pending| match &pending.kind {
            PhaseKind::Move {
                battler, command, ..
            } => priority_of(*battler, command) < priority,
            _ => false,
        });
        match slower {
            Some(at) => self.insert_at(at, phase),
            None => self.append(phase),
        }
        id
    }

    /// Run immediately after the current phase, ahead of earlier prepends.
    pub fn enqueue_prepend(&mut self, kind: PhaseKind) -> PhaseId {
        let phase = self.mint(kind);
        let id = phase.id;
        self.insert_at(0, phase);
        id
    }

    fn insert_at(&mut self, at: usize, phase: Phase) {
        self.pending.insert(at, phase);
        for mark in &mut self.splice_marks {
            if *mark >= at {
                *mark += 1;
            }
        }
        if at <= self.fresh {
            self.fresh += 1;
        }
    }

    fn remove_at(&mut self, at: usize) -> Option<Phase> {
        let phase = self.pending.remove(at)?;
        for mark in &mut self.splice_marks {
            if *mark > at {
                *mark -= 1;
            }
        }
        if at < self.fresh {
            self.fresh -= 1;
        }
        Some(phase)
    }

    /// Push a splice mark at the end of the fresh segment; returns its index.
    pub fn mark_splice_insertion_point(&mut self) -> usize {
        let mark = self.fresh;
        self.splice_marks.push(mark);
        mark
    }

    /// Drop the most recent splice mark. Idempotent on an empty stack.
    pub fn clear_splice_insertion_point(&mut self) -> Option<usize> {
        self.splice_marks.pop()
    }

    pub fn clear_splice_marks(&mut self) {
        self.splice_marks.clear();
    }

    #[must_use]
    pub fn splice_depth(&self) -> usize {
        self.splice_marks.len()
    }

    #[must_use]
    pub fn active_splice_mark(&self) -> Option<usize> {
        self.splice_marks.last().copied()
    }

    /// First pending phase matching `predicate`.
    pub fn find_phase<P>(&self, mut predicate: P) -> Option<&Phase>
    where
        P: FnMut(&Phase) -> bool,
    {
        self.pending.iter().find(|phase| predicate(phase))
    }

    pub fn find_phase_mut<P>(&mut self, mut predicate: P) -> Option<&mut Phase>
    where
        P: FnMut(&Phase) -> bool,
    {
        self.pending.iter_mut().find(|phase| predicate(phase))
    }

    #[must_use]
    pub fn has_phase<P>(&self, predicate: P) -> bool
    where
        P: FnMut(&Phase) -> bool,
    {
        self.find_phase(predicate).is_some()
    }

    /// Remove and return the first pending phase matching `predicate`.
    pub fn remove_phase<P>(&mut self, mut predicate: P) -> Option<Phase>
    where
        P: FnMut(&Phase) -> bool,
    {
        let at = self.pending.iter().position(|phase| predicate(phase))?;
        self.remove_at(at)
    }

    /// Swap the first pending phase matching `predicate` for `kind`, keeping
    /// its place in the queue. Returns the displaced phase.
    pub fn replace_phase<P>(&mut self, mut predicate: P, kind: PhaseKind) -> Option<Phase>
    where
        P: FnMut(&Phase) -> bool,
    {
        let at = self.pending.iter().position(|phase| predicate(phase))?;
        let phase = self.mint(kind);
        Some(std::mem::replace(&mut self.pending[at], phase))
    }

    /// Remove every pending phase matching `predicate`; returns the count.
    pub fn remove_all<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&Phase) -> bool,
    {
        let mut removed = 0;
        while self.remove_phase(&mut predicate).is_some() {
            removed += 1;
        }
        removed
    }

    #[must_use]
    pub fn has_kind(&self, name: PhaseName) -> bool {
        self.has_phase(|phase| phase.is(name))
    }

    pub fn remove_all_of(&mut self, name: PhaseName) -> usize {
        self.remove_all(|phase| phase.is(name))
    }

    /// Prepend a message, or append it when `defer` is set.
    pub fn queue_message(&mut self, text: impl Into<String>, defer: bool) -> PhaseId {
        let kind = PhaseKind::message(text);
        if defer {
            self.enqueue_append(kind)
        } else {
            self.enqueue_prepend(kind)
        }
    }

    /// Append the end-of-turn sequence.
    pub fn queue_turn_end_phases(&mut self) {
        self.enqueue_append(PhaseKind::WeatherEffect);
        self.enqueue_append(PhaseKind::Berry);
        self.enqueue_append(PhaseKind::CheckStatusEffect);
        self.enqueue_append(PhaseKind::TurnEnd { interlude: false });
    }

    /// Drop pending end-of-turn effects and flag the pending `TurnEnd` as an
    /// interlude. Returns how many effect phases were removed.
    pub fn on_interlude(&mut self) -> usize {
        let removed = self.remove_all(|phase| {
            matches!(
                phase.kind,
                PhaseKind::WeatherEffect | PhaseKind::Berry | PhaseKind::CheckStatusEffect
            )
        });
        if let Some(phase) = self.find_phase_mut(|phase| phase.is(PhaseName::TurnEnd))
            && let PhaseKind::TurnEnd { interlude } = &mut phase.kind
        {
            *interlude = true;
        }
        removed
    }

    /// Drop pending phases. With `leave_prepended`, phases the current phase
    /// already placed at the front survive.
    pub fn clear(&mut self, leave_prepended: bool) {
        if leave_prepended {
            self.pending.truncate(self.fresh);
        } else {
            self.pending.clear();
            self.fresh = 0;
        }
        let len = self.pending.len();
        for mark in &mut self.splice_marks {
            *mark = (*mark).min(len);
        }
    }

    /// Drop everything including splice marks and deferred phases.
    pub fn clear_all(&mut self) {
        self.clear(false);
        self.splice_marks.clear();
        self.deferred.clear();
    }

    /// Phases waiting for the next turn, in run order.
    pub fn deferred(&self) -> impl Iterator<Item = &Phase> {
        self.deferred.iter()
    }

    /// Refill for a new turn: deferred phases first, then `TurnInit`.
    pub(crate) fn populate_turn(&mut self) {
        while let Some(phase) = self.deferred.pop_front() {
            self.append(phase);
        }
        let init = self.mint(PhaseKind::TurnInit);
        self.append(init);
    }

    /// Take the next phase to make current. Resets the fresh segment.
    pub(crate) fn pop_next(&mut self) -> Option<Phase> {
        let phase = self.pending.pop_front()?;
        for mark in &mut self.splice_marks {
            *mark = mark.saturating_sub(1);
        }
        self.fresh = 0;
        Some(phase)
    }

    /// Start a fresh segment without popping (used when the current phase
    /// comes from outside the queue).
    pub(crate) const fn reset_fresh(&mut self) {
        self.fresh = 0;
    }

    /// Wrap a kind as a phase without queueing it.
    pub(crate) fn detached(&mut self, kind: PhaseKind) -> Phase {
        self.mint(kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phase> {
        self.pending.iter()
    }

    /// Names of pending phases in run order.
    #[must_use]
    pub fn names(&self) -> Vec<PhaseName> {
        self.pending.iter().map(Phase::name).collect()
    }
}
