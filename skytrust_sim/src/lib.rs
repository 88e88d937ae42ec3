//! SkyTrust simulation kernel
//!
//! Drives the engines of `skytrust_core` with a discrete-event loop:
//!
//! - **Time**: one global queue ordered by simulated time (FIFO on ties)
//! - **Nodes**: one long-lived task per node drains its bounded inbox
//! - **Consensus**: one short-lived task per round, decoupled from the loop
//! - **Randomness**: every generator is derived from the run seed
//!
//! A run ends when the queue is empty or the horizon is passed. The kernel
//! then closes every inbox and waits on a [`Quiescence`] barrier until all
//! background work is done before computing the final metrics.
//!
//! # Usage
//!
//! ```ignore
//! use skytrust_env::Protocol;
//! use skytrust_sim::ProtocolRunner;
//!
//! let runner = ProtocolRunner::new(42)?.with_seeds(5);
//! let batch = runner.run_batch(&Protocol::Barc.config())?;
//! println!("mean PDR {:.3}", batch.mean.unwrap().pdr);
//! ```

mod context;
mod event;
mod kernel;
mod node_task;
mod quiescence;
mod report;
mod runner;

pub use context::SimContext;
pub use event::{Event, EventKey, EventKind, EventQueue};
pub use kernel::Simulator;
pub use quiescence::{Quiescence, WorkGuard};
pub use report::{RunExport, RunReport};
pub use runner::{BatchResult, ProtocolRunner};
