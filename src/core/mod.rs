//! Core types: errors, configuration, the structured value model.

pub mod config;
pub mod errors;
pub mod value;
