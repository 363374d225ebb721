pub mod backup;
pub mod classify;
pub mod cli;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod fsops;
pub mod logging;
pub mod model;
pub mod mover;
pub mod permissions;
pub mod progress;
pub mod remote;
pub mod report;
pub mod scanner;
pub mod structure;
pub mod sync;

pub use config::AppConfig;
pub use engine::{EngineOptions, ExecutionEngine};
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
