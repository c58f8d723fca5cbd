pub mod config;
pub mod project;
pub mod yaml;
