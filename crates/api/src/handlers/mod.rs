pub mod jobs;
pub mod processing;
