//! ForceAtlas2 force-directed graph layout.
//!
//! Main components:
//! - [`engine`] — the [`ForceAtlas2`] engine and its step loop.
//! - [`phases`] — the parallel passes of one step.
//! - [`forces`] — repulsion, gravity and attraction formulas.
//! - [`region`] — Barnes-Hut region tree for approximate repulsion.
//! - [`speed`] — adaptive global speed.
//! - [`pool`] — fixed-size worker pool and failure policy.
//! - [`runner`] — stepping until a stop condition holds.
//! - [`graph`] — the node/edge model the engine lays out.
//! - [`config`] — run configuration.
//! - [`layout_data`] — per-node mass and displacement state.
//! - [`displacement_buffer`] — per-worker displacement accumulators.
//! - [`error`] — error type.
//! - [`types`] — shared type aliases and IDs.

pub mod config;
pub mod displacement_buffer;
pub mod engine;
pub mod error;
pub mod forces;
pub mod graph;
pub mod layout_data;
pub mod phases;
pub mod pool;
pub mod region;
pub mod runner;
pub mod speed;
pub mod types;

pub use config::{Config, Dimensions, FailurePolicy};
pub use engine::ForceAtlas2;
pub use error::{Error, Result};
pub use graph::{Edge, EdgeWeight, Graph, Node, WeightSample};
pub use runner::{RunSummary, StopCondition, StopReason, run};
