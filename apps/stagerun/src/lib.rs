//! # stagerun
//!
//! Command-line front end for `stagerun-core`: loads a pipeline definition,
//! applies the requested stage bounds and runs, plans or lists the stages.

pub mod cli;
pub mod config;
