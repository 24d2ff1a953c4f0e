pub mod controller;
pub mod processor;
pub mod report;

pub use controller::IngestionController;
pub use processor::DocumentProcessor;
pub use report::{DocumentOutcome, RunReport};
