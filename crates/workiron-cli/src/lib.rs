//! WorkIron CLI library.
//!
//! This crate provides the command-line interface and interactive REPL
//! for the WorkIron agent pipeline.

pub mod cli;
pub mod commands;
pub mod repl;
