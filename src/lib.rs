//! Mercado - request rate limiting and resilient billing calls
//!
//! This crate provides the two pieces of request-path infrastructure behind the
//! Mercado Productivo marketplace: an in-process fixed-window rate limiter keyed
//! by client identifier, and a retrying client for the external billing API.
//! The two are independent; the [`http`] module composes them into routes.

pub mod billing;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
