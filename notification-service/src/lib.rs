//! notification-service: the asynchronous notification worker.
//!
//! A single long-lived subscriber drains the durable notification queue,
//! renders and delivers each job by email, and settles every message
//! with an acknowledge or a requeueing reject.
pub mod config;
pub mod services;
