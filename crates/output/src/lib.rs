//! Scheduling of compressed inputs onto a bounded pool of decoders, and the
//! queues that carry reconstructed samples back out.

pub mod pull;
pub mod push;
pub mod queue;
pub mod slots;

pub use pull::PipeDistributor;
pub use push::SampleDistributor;
pub use queue::{output_channels, OutputReceiver, OutputSender};
pub use slots::{CycleReport, DecoderSlot, InputId, SlotTable, SourceTag, SurplusMonitor};
