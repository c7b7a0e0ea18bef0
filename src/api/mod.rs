//! HTTP API
//!
//! JSON transport over [`CaseService`](crate::service::CaseService): catalog,
//! spins, top-ups, balances, fairness checks and metrics.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{create_app, init_tracing, ApiServer};
