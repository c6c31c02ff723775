pub mod analyzers;
pub mod broker;
pub mod observability;
pub mod persistence;
pub mod progress;
pub mod text_processing;
