pub mod blame;
pub mod classify;
pub mod git;
pub mod identity;
pub mod path_filter;
pub mod pipeline;
pub mod recency;
pub mod resolver;
pub mod scanner;
pub mod stats;
