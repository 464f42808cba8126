pub mod cli;
pub mod config;
pub mod error;
pub mod lexicon;
pub mod paths;
pub mod pipeline;
pub mod server;
pub mod services;
pub mod text;
