pub mod eav_service;

pub use eav_service::{ApiResponse, EavService};
