//! Deduplicated repository analysis between a master and a worker.
//!
//! The master hands URLs to a worker, which answers with the repository
//! token at once and analyses repositories one at a time. The master then
//! polls with the tokens it still waits on and persists ready results.

pub mod cache;
pub mod client;
pub mod master;
pub mod store;
pub mod worker;
