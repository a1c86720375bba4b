#![warn(missing_docs)]
#![warn(clippy::all)]

//! Orchestrator routes parse, train and status requests for every agent:
//! it owns the loaded agents, supervises out-of-process training jobs, and
//! swaps in new artifacts once their job finished.

pub mod agent;
pub mod builder;
pub mod config;
pub mod error;
pub mod query_log;
pub mod registry;
pub mod router;
pub mod status;
pub mod supervisor;

pub use agent::{Inference, ModelLoader};
pub use builder::Builder;
pub use config::{Config, TrainingConfig};
pub use error::{Error, ErrorKind, Result};
pub use router::RequestRouter;
pub use status::Status;
pub use supervisor::{JobHandle, JobOutcome};
