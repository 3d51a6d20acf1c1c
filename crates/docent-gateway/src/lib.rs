//! HTTP API: bearer auth, document upload/list/delete, chat and admin listings.

mod error;
mod handlers;
mod router;
mod server;

pub use error::GatewayError;
pub use server::{AppState, GatewayServer};
