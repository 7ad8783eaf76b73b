//! Authentication module for managing the hub OAuth2 session.
//!
//! This module provides:
//! - `AuthSession`: owns the current credential, verifies it and refreshes it
//! - `grant`: request builders for the password, code and refresh grants
//! - `AuthParams` / `User`: token endpoint and "who am I" payloads
//!
//! A session moves between `Unauthenticated`, `Authenticated` and
//! `Refreshing`. A 401 from the verification call triggers exactly one
//! refresh; every other failure is returned to the caller.

pub mod error;
pub mod grant;
pub mod params;
pub mod session;

pub use error::AuthError;
pub use params::{AuthParams, User};
pub use session::{AuthSession, SessionState, TokenCheck, Verification};
