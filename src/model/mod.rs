pub mod apperror;
pub mod charts;
pub mod config;
pub mod derived;
pub mod models;
pub mod schema;
pub mod value;
pub mod views;
