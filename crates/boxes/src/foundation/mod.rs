//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the library:
//! - Math types and transform composition
//! - Logging utilities

pub mod math;
pub mod logging;
