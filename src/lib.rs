pub mod api;
pub mod chat;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mcp;
pub mod registry;
pub mod script;
pub mod store;
