pub mod cli;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod flock;
pub mod git;
pub mod model;

mod api;

pub use api::{Repofetch, RepofetchBuilder};
