//! coursemap: course-progression engine
//!
//! Computes per-profile maps of branching course content, active positions
//! and lesson unit chunks, and records progress with resource debits.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
