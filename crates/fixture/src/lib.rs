//! testrig fixture server
//!
//! Background HTTP and HTTPS listeners that give the program under test
//! something to fetch: static files from a document root plus registered
//! response hooks for dynamic paths.

pub mod error;
pub mod hooks;
pub mod paths;
pub mod server;
pub mod tls;

pub use error::{FixtureError, FixtureResult};
pub use hooks::{Echo, HookRegistry, HookRequest, ResponseHook, Status};
pub use paths::Translated;
pub use server::{FixtureConfig, FixtureServer};
