//! Read-only operator status API.
//!
//! - `GET /health`
//! - `GET /api/runs`: unfinished runs
//! - `GET /api/runs?date_key=YYYY-MM-DD`: every run for a date
//! - `GET /api/runs/{id}`: one run with its step log

pub mod routes;
pub mod state;
