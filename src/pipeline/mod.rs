//! Pipeline components: control, queues, the two thread pools and the orchestrator.

pub mod completion;
pub mod context;
pub mod control;
pub mod orchestrator;
pub mod processor_pool;
pub mod queue;
pub mod scanner_pool;
pub mod stats;

pub use completion::{CompletionTracker, should_delete};
pub use context::{PipelineContext, create_pipeline_context};
pub use control::{
    CancelToken, ControlSignal, Controller, ManualSignal, SentinelFiles, join_bounded,
};
pub use orchestrator::{run_pipeline, sanitize_sources};
pub use processor_pool::ProcessorPool;
pub use queue::{Offer, WorkQueue};
pub use scanner_pool::{Assignment, ScannerPool, scanner_thread_count};
pub use stats::{StatusCounts, Statistics};
