//! Test utilities for use case and route testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory repository implementations for mocking persistence
//! - An in-memory checkout provider that records every request
//! - `TestAppStateBuilder` for HTTP-level tests

mod app_state_builder;
mod factories;
mod ledger_mocks;
mod provider_mocks;
mod referral_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use ledger_mocks::*;
pub use provider_mocks::*;
pub use referral_mocks::*;
