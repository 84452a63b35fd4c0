pub mod cleaning;
pub mod config;
pub mod files;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod scrapers;
pub mod store;
