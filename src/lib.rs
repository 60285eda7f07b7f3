pub mod catalog;
pub mod cli;
pub mod config;
pub mod constants;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod scanner;
pub mod special;
pub mod walker;
