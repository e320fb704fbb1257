//! Engine integration tests against real settings files.

mod binding_tests;
mod common;
mod reload_tests;
