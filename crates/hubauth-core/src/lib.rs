//! Core library for hubauth.
//!
//! Obtains, caches, verifies and refreshes OAuth2 bearer tokens against a hub
//! identity server, and exposes the current credential to the rest of an
//! application.
//!
//! - `auth`: the `AuthSession` manager, grant builders and token types
//! - `api`: the `HttpTransport` seam and its reqwest implementation
//! - `cache`: the `KeyValueStore` seam with memory, file and keychain stores
//! - `config`: server and application configuration

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;

pub use api::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, StatusCode, TransportError,
};
pub use auth::{AuthError, AuthParams, AuthSession, SessionState, TokenCheck, User, Verification};
pub use cache::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
pub use config::{AppConfig, ServerConfig, StoreKind};
