//! Batch checking pipeline: dispatch probes, accumulate and partition results

pub mod accumulator;
pub mod orchestrator;

pub use accumulator::{
    FamilySummary, PartitionId, PartitionScope, PartitionSet, RenderedRecord, ResultAccumulator,
    RunSummary,
};
pub use orchestrator::{CheckOrchestrator, CheckReport, CheckerOptions, dispatch_order};
