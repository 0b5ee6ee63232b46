pub mod app;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod gaps;
pub mod gather;
pub mod output;
pub mod plan;
pub mod scheduler;
pub mod store;
pub mod waveform;
