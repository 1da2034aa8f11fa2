//! Deterministic event queue.
//!
//! A min-heap keyed by `(time, seq)`. Sequence numbers are minted by the
//! queue itself and strictly increase, so two runs that schedule the same
//! events in the same order pop them in the same order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::event::{Event, EventTarget};
use crate::types::SimTime;

/// The global event queue of one simulation run.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,
    next_seq: u64,
    peak_len: usize,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a new event and returns its sequence number.
    pub fn schedule(&mut self, time: SimTime, target: EventTarget) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Event::new(time, seq, target)));
        self.peak_len = self.peak_len.max(self.heap.len());
        seq
    }

    /// Pops the earliest event (lowest time, then lowest sequence number).
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|Reverse(e)| e)
    }

    /// Returns the earliest event without removing it.
    pub fn peek(&self) -> Option<&Event> {
        self.heap.peek().map(|Reverse(e)| e)
    }

    /// Returns true if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Total number of events ever scheduled on this queue.
    pub fn scheduled(&self) -> u64 {
        self.next_seq
    }

    /// Largest number of simultaneously pending events.
    pub fn peak_len(&self) -> usize {
        self.peak_len
    }

    /// Drains all pending events in pop order.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.heap.len());
        while let Some(e) = self.pop() {
            events.push(e);
        }
        events
    }
}
