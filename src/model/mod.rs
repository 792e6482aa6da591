pub mod config;
pub mod contrast;
pub mod scores;
pub mod stats;
