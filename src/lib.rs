//! Durable, at-least-once SMS retry scheduler.
//!
//! The [`scheduler::Scheduler`] is the core: a heap-ordered dispatch loop
//! over messages submitted through [`scheduler::Scheduler::new_message`],
//! backed by a pluggable [`persistence::PersistencePort`] and
//! [`send::SendPort`]. [`api`] exposes it over HTTP.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod persistence;
pub mod scheduler;
pub mod send;
pub mod stats;

pub use error::{Result, SchedulerError};
pub use scheduler::Scheduler;
