//! Inbound HTTP surface — classification, reminder, and digest routes.

pub mod routes;

pub use routes::{ApiState, api_routes};
