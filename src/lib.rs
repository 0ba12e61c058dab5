pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod models;
pub mod observability;
pub mod planner;
pub mod realtime;
pub mod state;
pub mod tracker;
