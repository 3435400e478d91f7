//! Authenticated API client
//!
//! Bearer-token injection plus a single-flight refresh-and-replay protocol:
//! a request that comes back 401 triggers one token refresh (shared by every
//! concurrent 401) and is resent once with the replaced credentials. Callers
//! never observe the intermediate 401.

pub mod client;
mod refresh;
pub mod session;

pub use client::{ApiClient, ApiRequest};
pub use session::{CredentialPair, Principal, SessionStore, TokenGrant};
