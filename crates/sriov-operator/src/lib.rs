//! Drain coordination and status aggregation core of the SR-IOV network
//! operator.

pub mod client;
pub mod conditions;
pub mod config;
pub mod controller;
pub mod drain;
pub mod error;
pub mod labels;
pub mod pool_pause;
pub mod status;
