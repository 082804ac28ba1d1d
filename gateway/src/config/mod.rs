//! Configuration management for the gateway: typed settings and their validation from the
//! environment.

mod loader;
mod types;

pub use loader::*;
pub use types::*;
