pub mod db;
pub mod repository;
pub mod session;
mod startup;
mod state;

// Re-export a curated crate-visible surface for consumers of `crate::app`
pub use db::DbPool;
pub use startup::SHUTDOWN_GRACE;
pub(crate) use startup::start;
pub use state::AppState;
