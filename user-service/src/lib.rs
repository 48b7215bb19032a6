//! user-service: the invitation and authentication core.
//!
//! The operations on [`services::InvitationService`] are the outward
//! interface of this crate: callables returning typed results or
//! [`service_core::error::AppError`]-convertible errors. The HTTP layer
//! consuming this crate owns the mapping to status codes and response
//! envelopes.
pub mod config;
pub mod db;
pub mod dtos;
pub mod models;
pub mod services;
pub mod utils;
