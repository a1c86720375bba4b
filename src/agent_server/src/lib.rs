//! This crate is the composite of API layer, Orchestrator, and Interpreter.
//! It serves agents over gRPC and provides the trainer executed for every training job.

#![warn(clippy::all)]

pub mod backend;
pub mod grpc;
pub mod training;

pub use backend::Loader;
pub use training::train_and_persist;
