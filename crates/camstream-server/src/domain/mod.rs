//! Domain layer for camstream-server.
//!
//! The domain layer contains plain data types that have no dependencies on
//! I/O, networking, or async runtimes.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration structures and their defaults
//! - Parsing of configuration *text* (not reading files)
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;

pub use config::{ConfigError, FileConfig, ServerConfig, TestPattern};
