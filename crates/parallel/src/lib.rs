//! # GreenAccess Parallel
//!
//! Execution plumbing for the accessibility model.
//!
//! This crate provides:
//! - `ProcessingMode`: sequential or rayon-parallel execution chosen from a worker count
//! - `TaskGraph`: dependency-scheduled tasks keyed by their output files, with
//!   up-to-date skipping across runs

pub mod strategy;
pub mod taskgraph;

pub use strategy::{ParallelStrategy, ProcessingMode};
pub use taskgraph::{Task, TaskGraph, TaskId, TaskReport};
