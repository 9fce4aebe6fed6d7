pub mod connection;
pub mod handlers;
