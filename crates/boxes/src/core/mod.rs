//! Core library settings
//!
//! Groups the serializable settings structs consumed by the renderer and the
//! post-processing pipeline.

pub mod config;
