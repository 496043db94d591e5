pub mod abilities;
pub mod config;
pub mod constants;
pub mod cooldowns;
pub mod engine;
pub mod error;
pub mod escape;
pub mod events;
pub mod items;
pub mod memory;
pub mod runtime;
pub mod services;
pub mod tracker;
pub mod types;
