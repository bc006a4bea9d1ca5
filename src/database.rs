pub mod admin;
pub mod challenge;
pub mod postgres_repository;
pub mod progress;
pub mod session;
pub mod user;
