pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod report;
pub mod scheduler;
pub mod sentiment;
pub mod storage;
pub mod utils;
