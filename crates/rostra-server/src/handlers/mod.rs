pub mod admin;
pub mod billing;
pub mod profile;
pub mod users;
