pub mod classifier;
pub mod report;
