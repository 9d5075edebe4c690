//! Time-bucketed line attribution for git repositories, plus the
//! master/worker job protocol that computes it once per repository.

pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod jobs;
pub mod presentation;
pub mod server;
pub mod utils;
