pub mod cleanse;
pub mod config;
mod server;

pub use cleanse::*;
pub use config::*;
pub use server::{DynCleanseProvider, ServerError, build_api_router, build_app_router, serve};
