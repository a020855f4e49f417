//! Artifact scanner: glob matching, content sniffing, tree sources and the walker.

pub mod archive;
pub mod item;
pub mod matcher;
pub mod overrides;
pub mod sniff;
pub mod source;
pub mod walker;
