//! AdBrain workflow engine.
//!
//! A campaign run walks a fixed DAG of nodes. Generators call the provider
//! chain, aggregators score the shared context, and the sink assembles the
//! campaign blueprint. Runs that cannot produce a blueprint are replaced by
//! a synthesized placeholder before archiving.

pub mod context;
pub mod engine;
pub mod fallback;
pub mod graph;
pub mod history;
pub mod pipeline;
pub mod registry;
pub mod run_log;
pub mod scoring;
pub mod signals;

pub use context::{ContextSnapshot, ExecutionContext};
pub use engine::{ArchiveStatus, GraphStatus, RunOutcome, WorkflowEngine};
pub use fallback::FallbackSynthesizer;
pub use graph::{
    Edge, ExecutionRecord, GraphDescriptor, GraphExecutor, NodeDescriptor, NodeState,
    OutputFormat, Visualization, WorkflowGraph, WorkflowNode,
};
pub use history::ExecutionHistory;
pub use registry::{Aggregate, NodeRegistry, TerminalArtifacts};
pub use run_log::RunLogger;
pub use signals::{build_signal_source, SimulatedSignals, StaticSignals};
