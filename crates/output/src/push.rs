// Copyright 2025-2026 CEMAXECUTER LLC

use crate::slots::{cycle_surplus, CycleReport, DecoderSlot, SlotTable, SourceTag, SurplusMonitor};

/// Distributes caller-supplied input buffers across a pool of decoder
/// outputs, one input per output.
///
/// The caller drives it one cycle at a time with whatever each input has
/// available. Each output corresponds to one decoder slot.
pub struct SampleDistributor {
    item_size: usize,
    table: SlotTable,
    /// Items written to each output so far
    written: Vec<u64>,
    surplus: SurplusMonitor,
}

impl SampleDistributor {
    pub fn new(item_size: usize, decoders: usize) -> Self {
        assert!(item_size > 0, "item size must be non-zero");
        Self {
            item_size,
            table: SlotTable::new(decoders),
            written: vec![0; decoders],
            surplus: SurplusMonitor::new(),
        }
    }

    pub fn item_size(&self) -> usize {
        self.item_size
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

    /// Run one scheduling cycle.
    ///
    /// `inputs[i]` holds the bytes input `i` has available; whole items are
    /// used and any trailing partial item is left for the caller. At most
    /// `max_items` items are copied into each output. The number of outputs
    /// sets the number of decoder slots.
    ///
    /// An input that has no items this cycle loses its slot, even if its
    /// producer is merely slow and has not ended. A slow input can therefore
    /// hop between slots. This matches the deployed behavior and is likely a
    /// latent bug; the pipe distributor only releases on end of file.
    pub fn work(
        &mut self,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
        max_items: usize,
    ) -> CycleReport {
        if outputs.len() != self.table.len() {
            log::info!(
                "decoder slots changed from {} to {}",
                self.table.len(),
                outputs.len()
            );
            self.table.resize(outputs.len());
            self.written.resize(outputs.len(), 0);
        }

        let item_size = self.item_size;
        let available = |input: usize| inputs.get(input).map_or(0, |b| b.len() / item_size);
        let mut report = CycleReport::new(inputs.len(), outputs.len());

        // Release slots whose input has nothing this cycle
        for (slot, input) in self.table.bindings() {
            if available(input) == 0 {
                self.table.release(slot);
                report.released += 1;
            }
        }

        for (slot, input) in self.table.bindings() {
            self.copy(inputs[input], input, slot, outputs, max_items, &mut report);
        }

        for input in 0..inputs.len() {
            if available(input) == 0 || self.table.slot_of(input).is_some() {
                continue;
            }
            match self.table.bind_free(input) {
                Some(slot) => {
                    self.copy(inputs[input], input, slot, outputs, max_items, &mut report)
                }
                None => report.starved += 1,
            }
        }

        report.surplus = cycle_surplus(&self.table, report.starved);
        if report.surplus < 0 {
            log::warn!("{} inputs have no decoder", -report.surplus);
        }
        self.surplus.publish(report.surplus);
        report
    }

    fn copy(
        &mut self,
        input_data: &[u8],
        input: usize,
        slot: usize,
        outputs: &mut [&mut [u8]],
        max_items: usize,
        report: &mut CycleReport,
    ) {
        let output = &mut outputs[slot];
        let items = (input_data.len() / self.item_size)
            .min(output.len() / self.item_size)
            .min(max_items);
        if items == 0 {
            return;
        }
        let bytes = items * self.item_size;
        output[..bytes].copy_from_slice(&input_data[..bytes]);

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

    /// Current binding of each slot
    pub fn slot_states(&self) -> Vec<DecoderSlot> {
        (0..self.table.len())
            .filter_map(|slot| self.table.get(slot))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a cycle where the inputs flagged true have 8 bytes of data
    fn cycle(
        dist: &mut SampleDistributor,
        has_data: &[bool],
        decoders: usize,
    ) -> CycleReport {
        let data: Vec<Vec<u8>> = has_data
            .iter()
            .enumerate()
            .map(|(i, &d)| if d { vec![i as u8; 8] } else { Vec::new() })
            .collect();
        let inputs: Vec<&[u8]> = data.iter().map(|d| d.as_slice()).collect();
        let mut out_bufs = vec![vec![0u8; 64]; decoders];
        let mut outputs: Vec<&mut [u8]> = out_bufs.iter_mut().map(|b| b.as_mut_slice()).collect();
        dist.work(&inputs, &mut outputs, 16)
    }

    #[test]
    fn test_three_inputs_two_decoders() {
        // C gets data once A ends
        let mut dist = SampleDistributor::new(4, 2);
        let report = cycle(&mut dist, &[true, true, false], 2);
        assert_eq!(dist.slot_states(), vec![DecoderSlot::Bound(0), DecoderSlot::Bound(1)]);
        assert_eq!(report.surplus, 0);
        assert_eq!(report.produced, vec![2, 2]);

        let report = cycle(&mut dist, &[false, true, true], 2);
        assert_eq!(dist.slot_states(), vec![DecoderSlot::Bound(2), DecoderSlot::Bound(1)]);
        assert_eq!(report.released, 1);
        assert_eq!(report.surplus, 0);
        assert_eq!(dist.decoder_surplus(), 0);

        // C stays idle instead
        let mut dist = SampleDistributor::new(4, 2);
        cycle(&mut dist, &[true, true, false], 2);
        let report = cycle(&mut dist, &[false, true, false], 2);
        assert_eq!(dist.slot_states(), vec![DecoderSlot::Free, DecoderSlot::Bound(1)]);
        assert_eq!(report.surplus, 1);
        assert_eq!(dist.surplus_monitor().get(), 1);
    }

    #[test]
    fn test_starved_inputs_make_surplus_negative() {
        let mut dist = SampleDistributor::new(4, 1);
        let report = cycle(&mut dist, &[true, true, true], 1);
        assert_eq!(report.starved, 2);
        assert_eq!(report.surplus, -2);
        assert_eq!(report.consumed, vec![2, 0, 0]);
    }

    #[test]
    fn test_copies_and_tags() {
        let mut dist = SampleDistributor::new(2, 2);
        let a = [1u8, 2, 3, 4, 5, 6, 7];
        let b = [9u8, 9];
        let inputs: Vec<&[u8]> = vec![&a[..], &b[..]];
        let mut out0 = [0u8; 4];
        let mut out1 = [0u8; 8];

        let report = {
            let mut outputs: Vec<&mut [u8]> = vec![&mut out0[..], &mut out1[..]];
            dist.work(&inputs, &mut outputs, 100)
        };
        // Output 0 only has room for two items; the odd trailing byte is never taken
        assert_eq!(out0, [1, 2, 3, 4]);
        assert_eq!(&out1[..2], &[9, 9]);
        assert_eq!(report.consumed, vec![2, 1]);
        assert_eq!(
            report.tags,
            vec![
                (0, SourceTag { offset: 0, source: 0 }),
                (1, SourceTag { offset: 0, source: 1 }),
            ]
        );

        let report = {
            let mut outputs: Vec<&mut [u8]> = vec![&mut out0[..], &mut out1[..]];
            dist.work(&inputs, &mut outputs, 1)
        };
        assert_eq!(report.produced, vec![1, 1]);
        assert_eq!(report.tags[0].1, SourceTag { offset: 2, source: 0 });
    }

    #[test]
    fn test_never_double_binds() {
        let mut dist = SampleDistributor::new(1, 3);
        let patterns: [[bool; 5]; 6] = [
            [true, true, true, true, true],
            [false, true, false, true, true],
            [true, false, true, false, false],
            [true, true, true, true, true],
            [false, false, false, false, false],
            [false, false, false, false, true],
        ];
        for pattern in patterns.iter() {
            let report = cycle(&mut dist, pattern, 3);
            let bound: Vec<usize> = dist
                .slot_states()
                .into_iter()
                .filter_map(|s| match s {
                    DecoderSlot::Bound(i) => Some(i),
                    DecoderSlot::Free => None,
                })
                .collect();
            let mut unique = bound.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), bound.len(), "double binding in {:?}", bound);
            // Every bound input had data
            assert!(bound.iter().all(|&i| pattern[i]));
            let with_data = pattern.iter().filter(|&&d| d).count();
            assert_eq!(bound.len(), with_data.min(3));
            assert_eq!(report.surplus, 3 - with_data as i32);
        }
    }

    #[test]
    fn test_output_count_resizes_slots() {
        let mut dist = SampleDistributor::new(4, 1);
        let report = cycle(&mut dist, &[true, true], 2);
        assert_eq!(dist.slots().len(), 2);
        assert_eq!(report.surplus, 0);
    }
}
