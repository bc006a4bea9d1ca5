pub mod admin;
pub mod ai;
pub mod auth;
pub mod error;
pub mod health;
pub mod progress;
