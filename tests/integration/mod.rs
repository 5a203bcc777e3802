//! Integration test suite for delve.
//!
//! These tests drive whole research sessions through the public API, from
//! query to handoff, against scripted collaborators.
//!
//! # Test Categories
//!
//! - `session_e2e`: Full session from plan to resolved report
//! - `dispatcher`: Parallel dispatch, retries, and deadlines
//! - `gates`: Plan validator and completion judge behavior
//! - `recovery`: Failures, re-queues, and cancellation
//! - `convergence`: Budgets, early acceptance, and the judge loop
//! - `properties`: Property tests over the task graph
//!
//! # CI Compatibility
//!
//! No test reaches the network or a real model.

mod fixtures;

mod convergence;
mod dispatcher;
mod gates;
mod recovery;
