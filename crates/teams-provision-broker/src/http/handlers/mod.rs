pub mod auth;
pub mod consent;
pub mod provision;
pub mod status;
