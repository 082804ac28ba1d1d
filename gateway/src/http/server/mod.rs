//! HTTP server wiring: the router and the middleware stack around it.

pub mod middleware;
pub mod router;

pub use router::create_app;
