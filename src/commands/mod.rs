pub mod plan;
pub mod provision;
pub mod render;
pub mod services;
