pub mod ai;
pub mod password;
