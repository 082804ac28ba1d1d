//! Integration tests for the gateway.
//!
//! Uses the single integration test approach: one binary, one module per area.
#![expect(
    clippy::tests_outside_test_module,
    reason = "This is an integration test binary, so the test module is the whole crate"
)]
#![expect(clippy::shadow_unrelated, reason = "Responses are rebound step by step")]
#![expect(clippy::unwrap_used, reason = "Tests should panic on unexpected state")]

extern crate alloc;
extern crate core;

mod common;
mod health;
mod workspaces;
