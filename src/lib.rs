pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod render;
pub mod repository;
pub mod schema;
pub mod services;
pub mod sync;
pub mod validation;
