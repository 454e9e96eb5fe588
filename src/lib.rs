// resilient-fetch: retry and circuit-breaker layer for outbound HTTP calls
// Exposes the resilient call path and its call sites as a library

pub mod circuit_breaker;
pub mod cli;
pub mod client;
pub mod fetcher;
pub mod http;
pub mod outcome;
pub mod registry;
pub mod retry;
pub mod validation;
