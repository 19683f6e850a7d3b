pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod script;
pub mod state;
pub mod submit;
