//! Durable polling orchestration.
//!
//! A run searches for one date's content: it polls a [`ContentFetcher`] at a
//! fixed interval until the content appears or the deadline passes, then hands
//! it to a [`Notifier`] at most once. Every externally visible action is
//! recorded in the run's step log, and driving a run always replays that log
//! first, so a run survives process restarts without repeating a delivery.
//!
//! [`ContentFetcher`]: courier_fetcher::ContentFetcher
//! [`Notifier`]: courier_notifier::Notifier

pub mod clock;
pub mod context;
pub mod controller;
pub mod decision;
pub mod driver;
pub mod error;
pub mod step;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::Orchestrator;
pub use driver::RunDriver;
pub use error::EngineError;
pub use store::{InMemoryRunStore, PgRunStore, RunStore, StoreError};
