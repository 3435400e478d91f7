//! Reverse proxy gateway
//!
//! Stateless request forwarding from the board UI to the upstream API.

pub mod router;
pub mod server;

pub use router::{AppState, create_router};
pub use server::Gateway;
