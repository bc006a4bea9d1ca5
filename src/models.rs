pub mod admin;
pub mod ai;
pub mod health;
pub mod progress;
pub mod session;
pub mod user;
