//! vacwatch: a job-board watcher that crawls saved searches on a schedule,
//! asks a generative model whether each new vacancy matches the user's
//! wish, and raises a notification event exactly once per posting.

pub mod admin;
pub mod analysis;
pub mod clients;
pub mod config;
pub mod db;
pub mod events;
pub mod model;
pub mod repo;
pub mod telemetry;
