// Copyright 2025-2026 CEMAXECUTER LLC

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Identifies one input channel of a distributor
pub type InputId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderSlot {
    Free,
    Bound(InputId),
}

/// Fixed pool of decoder slots, each holding at most one input
pub struct SlotTable {
    slots: Vec<DecoderSlot>,
}

impl SlotTable {
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![DecoderSlot::Free; count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<DecoderSlot> {
        self.slots.get(slot).copied()
    }

    /// Change the number of slots. Inputs bound to removed slots lose them.
    pub fn resize(&mut self, count: usize) {
        if count < self.slots.len() {
            for (slot, state) in self.slots.iter().enumerate().skip(count) {
                if let DecoderSlot::Bound(input) = state {
                    log::debug!("slot {} removed, unbinding input {}", slot, input);
                }
            }
        }
        self.slots.resize(count, DecoderSlot::Free);
    }

    /// Slot holding `input`, if any
    pub fn slot_of(&self, input: InputId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| *s == DecoderSlot::Bound(input))
    }

    /// Bind `input` to the lowest-numbered free slot
    pub fn bind_free(&mut self, input: InputId) -> Option<usize> {
        debug_assert!(self.slot_of(input).is_none(), "input {} bound twice", input);
        let slot = self.slots.iter().position(|s| *s == DecoderSlot::Free)?;
        self.slots[slot] = DecoderSlot::Bound(input);
        log::debug!("input {} bound to slot {}", input, slot);
        Some(slot)
    }

    pub fn release(&mut self, slot: usize) {
        if let Some(state) = self.slots.get_mut(slot) {
            if let DecoderSlot::Bound(input) = *state {
                log::debug!("input {} released slot {}", input, slot);
            }
            *state = DecoderSlot::Free;
        }
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| **s == DecoderSlot::Free).count()
    }

    /// (slot, input) for every bound slot, in slot order
    pub fn bindings(&self) -> Vec<(usize, InputId)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, s)| match *s {
                DecoderSlot::Bound(input) => Some((slot, input)),
                DecoderSlot::Free => None,
            })
            .collect()
    }
}

/// Annotation placed on an output when it receives data from an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTag {
    /// Item count of the output before this cycle's data
    pub offset: u64,
    pub source: InputId,
}

/// Item counts and tags from one distributor cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Items taken from each input
    pub consumed: Vec<usize>,
    /// Items written to each output
    pub produced: Vec<usize>,
    /// (output, tag) pairs
    pub tags: Vec<(usize, SourceTag)>,
    pub released: usize,
    /// Inputs with data that found no free slot
    pub starved: usize,
    pub surplus: i32,
}

impl CycleReport {
    pub(crate) fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            consumed: vec![0; inputs],
            produced: vec![0; outputs],
            ..Self::default()
        }
    }
}

/// Read-only handle to a distributor's decoder surplus.
///
/// Positive means idle decoder slots, negative means inputs with data went
/// without a slot, zero means supply matched demand.
#[derive(Debug, Clone)]
pub struct SurplusMonitor {
    value: Arc<AtomicI32>,
}

impl SurplusMonitor {
    pub(crate) fn new() -> Self {
        Self {
            value: Arc::new(AtomicI32::new(0)),
        }
    }

    pub fn get(&self) -> i32 {
        self.value.load(Ordering::Relaxed)
    }

    pub(crate) fn publish(&self, surplus: i32) {
        self.value.store(surplus, Ordering::Relaxed);
    }
}

/// Idle slots minus starved inputs for the cycle just finished
pub(crate) fn cycle_surplus(table: &SlotTable, starved: usize) -> i32 {
    table.free_count() as i32 - starved as i32
}
