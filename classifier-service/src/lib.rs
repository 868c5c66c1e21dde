//! Email classifier backend: relays email text to a generative AI model and
//! returns a structured classification with a suggested reply.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};
