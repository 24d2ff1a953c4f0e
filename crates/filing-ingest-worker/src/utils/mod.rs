pub mod error;
pub mod logger;
pub mod metrics;

pub use error::WorkerError;
pub use metrics::{Metrics, Timer};
