//! Integration test suite for Crucible.
//!
//! These tests exercise the full flow from task creation through
//! refinement to final output, using scripted agents instead of real
//! processes.
//!
//! # Test Categories
//!
//! - `refinement_e2e`: Refinement loop behavior across iterations
//! - `orchestration_e2e`: Task lifecycle, decomposition, and execution
//!
//! # CI Compatibility
//!
//! All agents are in-memory fixtures; no external binaries or API calls
//! are involved, making the suite safe to run in CI environments.

mod fixtures;

mod orchestration_e2e;
mod refinement_e2e;
