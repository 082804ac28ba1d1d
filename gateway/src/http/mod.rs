//! HTTP surface of the gateway.
//!
//! Public: the login flow under `/auth` and `/health`. Private: everything under `/user`.

pub mod auth;
pub mod health;
pub mod server;
pub mod user;
pub mod workspaces;

pub use server::create_app;
