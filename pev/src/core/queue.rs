//! Action queue and reconciliation-cycle bookkeeping.
//!
//! The queue owns the pending actions, the single action in flight and the
//! cycle counter. Dequeuing captures the action's prediction and a value clone
//! of the domain in one step, so both always describe the action about to run.

use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::types::Prediction;

/// An action between dequeue and its verification verdict.
#[derive(Debug, Clone)]
pub struct InFlight<A, D> {
    pub action: A,
    pub prediction: Option<Prediction>,
    /// Domain as it was immediately before `execute`.
    pub snapshot: D,
}

/// FIFO queue of pending actions plus the cycle counter.
#[derive(Debug, Clone)]
pub struct ActionQueue<A, D> {
    pending: VecDeque<A>,
    in_flight: Option<InFlight<A, D>>,
    label: Option<String>,
    cycle_count: u32,
    max_cycles: u32,
}

impl<A, D: Clone> ActionQueue<A, D> {
    pub fn new(max_cycles: u32) -> Result<Self> {
        if max_cycles == 0 {
            return Err(anyhow!("max_cycles must be > 0"));
        }
        Ok(Self {
            pending: VecDeque::new(),
            in_flight: None,
            label: None,
            cycle_count: 0,
            max_cycles,
        })
    }

    /// Replace the pending actions with a freshly built queue.
    pub fn build<I>(&mut self, label: Option<String>, actions: I)
    where
        I: IntoIterator<Item = A>,
    {
        self.pending = actions.into_iter().collect();
        self.label = label;
    }

    /// Drop every pending action. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Append one action to the tail of the pending queue.
    pub fn push(&mut self, action: A) {
        self.pending.push_back(action);
    }

    /// Pop the head action, caching its prediction and a snapshot of `domain`.
    ///
    /// Returns `Ok(None)` when the queue is empty. Errors if an action is
    /// already in flight.
    pub fn dequeue<F>(&mut self, domain: &D, predict: F) -> Result<Option<&InFlight<A, D>>>
    where
        F: FnOnce(&A, &D) -> Option<Prediction>,
    {
        if self.in_flight.is_some() {
            return Err(anyhow!("cannot dequeue while an action is in flight"));
        }
        let Some(action) = self.pending.pop_front() else {
            return Ok(None);
        };
        let prediction = predict(&action, domain);
        self.in_flight = Some(InFlight {
            action,
            prediction,
            snapshot: domain.clone(),
        });
        Ok(self.in_flight.as_ref())
    }

    pub fn in_flight(&self) -> Option<&InFlight<A, D>> {
        self.in_flight.as_ref()
    }

    /// Clear the in-flight slot, returning the action with its scratch data.
    pub fn finish(&mut self) -> Option<InFlight<A, D>> {
        self.in_flight.take()
    }

    /// Count one finished reconciliation cycle. Never exceeds `max_cycles`.
    pub fn complete_cycle(&mut self) -> u32 {
        self.cycle_count = (self.cycle_count + 1).min(self.max_cycles);
        self.cycle_count
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &A> {
        self.pending.iter()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn max_cycles(&self) -> u32 {
        self.max_cycles
    }

    pub fn max_cycles_reached(&self) -> bool {
        self.cycle_count >= self.max_cycles
    }
}
