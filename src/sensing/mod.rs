pub mod config;
pub mod controller;
mod loop_worker;
pub mod state;

pub use config::SamplingConfig;
pub use controller::{SamplingLoop, StartOutcome};
pub use state::LoopStatus;
