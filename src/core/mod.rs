//! Core planning models.
//!
//! This module contains the task data model and the dependency graph the
//! executor schedules from.

pub mod dag;
pub mod task;

pub use dag::{MarkOutcome, TaskGraph, DEFAULT_MAX_ATTEMPTS};
pub use task::{Priority, Task, TaskId, TaskStatus};
