pub mod api;
pub mod app;
pub mod bootstrap;
pub mod config;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod pagination;
pub mod query;
pub mod registration;
pub mod resources;
pub mod search;
pub mod store;
pub mod validation;
