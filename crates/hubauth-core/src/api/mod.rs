//! HTTP transport module.
//!
//! The session manager never talks to reqwest directly. It builds
//! `HttpRequest` values and hands them to an `HttpTransport`, which returns
//! the status code and body text. `ReqwestTransport` is the production
//! implementation; tests substitute a recording fake.

pub mod client;
pub mod error;
pub mod transport;

pub use client::ReqwestTransport;
pub use error::TransportError;
pub use transport::{HttpRequest, HttpResponse, HttpTransport};

pub use reqwest::{Method, StatusCode};

#[cfg(test)]
pub(crate) mod fake;
