//! Command handlers for the `glot` binary.

pub mod commands;
pub mod spec;
