// Copyright 2025-2026 CEMAXECUTER LLC

use std::path::Path;

use sd_sdr::{NamedPipeMultiplexer, PipeError, ReadOutcome};

use crate::slots::{cycle_surplus, CycleReport, SlotTable, SourceTag, SurplusMonitor};

/// Distributor whose inputs are named pipes.
///
/// Each cycle blocks until some pipe is readable, then reads without
/// blocking. An input keeps its slot while its pipe is merely empty and
/// gives it up only at end of file.
pub struct PipeDistributor {
    mux: NamedPipeMultiplexer,
    item_size: usize,
    table: SlotTable,
    written: Vec<u64>,
    /// Bytes of a partial item, per input, waiting for the rest
    carry: Vec<Vec<u8>>,
    surplus: SurplusMonitor,
}

impl PipeDistributor {
    pub fn new(mux: NamedPipeMultiplexer, item_size: usize, decoders: usize) -> Self {
        assert!(item_size > 0, "item size must be non-zero");
        let inputs = mux.len();
        Self {
            mux,
            item_size,
            table: SlotTable::new(decoders),
            written: vec![0; decoders],
            carry: vec![Vec::with_capacity(item_size); inputs],
            surplus: SurplusMonitor::new(),
        }
    }

    /// Open the pipes (blocking until each has a writer) and build a distributor
    pub fn open<P: AsRef<Path>>(
        paths: &[P],
        item_size: usize,
        decoders: usize,
    ) -> Result<Self, PipeError> {
        let mux = NamedPipeMultiplexer::open(paths)?;
        Ok(Self::new(mux, item_size, decoders))
    }

    pub fn inputs(&self) -> usize {
        self.mux.len()
    }

    pub fn slots(&self) -> &SlotTable {
        &self.table
    }

    pub fn surplus_monitor(&self) -> SurplusMonitor {
        self.surplus.clone()
    }

    pub fn decoder_surplus(&self) -> i32 {
        self.surplus.get()
    }

    /// Every pipe has closed and no slot is bound
    pub fn is_finished(&self) -> bool {
        self.mux.all_pipes_closed() && self.table.free_count() == self.table.len()
    }

    /// Wait for data and run one scheduling cycle.
    ///
    /// Returns without waiting when every pipe is closed.
    pub fn work(
        &mut self,
        outputs: &mut [&mut [u8]],
        max_items: usize,
    ) -> Result<CycleReport, PipeError> {
        if outputs.len() != self.table.len() {
            log::info!(
                "decoder slots changed from {} to {}",
                self.table.len(),
                outputs.len()
            );
            self.table.resize(outputs.len());
            self.written.resize(outputs.len(), 0);
        }
        if !self.mux.all_pipes_closed() {
            self.mux.wait_for_samples()?;
        }

        let mut report = CycleReport::new(self.mux.len(), outputs.len());

        for (slot, input) in self.table.bindings() {
            if self.mux.pipe_closed(input) {
                self.table.release(slot);
                report.released += 1;
            }
        }

        for (slot, input) in self.table.bindings() {
            if !self.mux.is_ready(input) {
                continue;
            }
            if self.fill(input, slot, outputs, max_items, &mut report)? {
                self.table.release(slot);
                report.released += 1;
            }
        }

        for input in 0..self.mux.len() {
            if self.table.slot_of(input).is_some()
                || self.mux.pipe_closed(input)
                || !self.mux.is_ready(input)
                || !self.has_data(input)?
            {
                continue;
            }
            match self.table.bind_free(input) {
                Some(slot) => {
                    if self.fill(input, slot, outputs, max_items, &mut report)? {
                        self.table.release(slot);
                        report.released += 1;
                    }
                }
                None => report.starved += 1,
            }
        }

        report.surplus = cycle_surplus(&self.table, report.starved);
        if report.surplus < 0 {
            log::warn!("{} inputs have no decoder", -report.surplus);
        }
        self.surplus.publish(report.surplus);
        Ok(report)
    }

    /// Whether a ready, unbound input has bytes to hand out.
    ///
    /// A pipe reported ready with nothing buffered has usually hung up; the
    /// probe read closes it in that case.
    fn has_data(&mut self, input: usize) -> Result<bool, PipeError> {
        if self.mux.bytes_available(input)? > 0 {
            return Ok(true);
        }
        let mut probe = [0u8; 1];
        match self.mux.read_samples(input, &mut probe)? {
            ReadOutcome::Data(n) => {
                self.carry[input].extend_from_slice(&probe[..n]);
                Ok(n > 0)
            }
            ReadOutcome::NoData => Ok(false),
            ReadOutcome::Closed => {
                self.drop_partial(input);
                Ok(false)
            }
        }
    }

    /// Copy whole items from `input` into the output of `slot`.
    /// Returns true if the pipe reached end of file.
    fn fill(
        &mut self,
        input: usize,
        slot: usize,
        outputs: &mut [&mut [u8]],
        max_items: usize,
        report: &mut CycleReport,
    ) -> Result<bool, PipeError> {
        let item_size = self.item_size;
        let output = &mut outputs[slot];
        let capacity = (output.len() / item_size).min(max_items) * item_size;
        if capacity == 0 {
            return Ok(false);
        }

        let carry = &mut self.carry[input];
        let mut filled = carry.len();
        output[..filled].copy_from_slice(carry);
        carry.clear();

        let closed = match self.mux.read_samples(input, &mut output[filled..capacity])? {
            ReadOutcome::Data(n) => {
                filled += n;
                false
            }
            ReadOutcome::NoData => false,
            ReadOutcome::Closed => true,
        };

        let whole = filled / item_size * item_size;
        self.carry[input].extend_from_slice(&output[whole..filled]);
        if closed {
            self.drop_partial(input);
        }

        let items = whole / item_size;
        if items > 0 {
            report.tags.push((
                slot,
                SourceTag {
                    offset: self.written[slot],
                    source: input,
                },
            ));
            self.written[slot] += items as u64;
            report.consumed[input] += items;
            report.produced[slot] += items;
        }
        Ok(closed)
    }

    fn drop_partial(&mut self, input: usize) {
        let partial = &mut self.carry[input];
        if !partial.is_empty() {
            log::warn!(
                "input {} closed with {} bytes of an incomplete item",
                input,
                partial.len()
            );
            partial.clear();
        }
    }
}
