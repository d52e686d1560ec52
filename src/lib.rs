pub mod config;
pub mod decompose;
pub mod ensemble;
pub mod error;
pub mod fallback;
pub mod model;
pub mod orchestrator;
pub mod predictor;
pub mod registry;
pub mod sentiment;
pub mod source;
pub mod trainer;

pub use error::{ForecastError, ForecastResult};
pub use orchestrator::ForecastOrchestrator;
