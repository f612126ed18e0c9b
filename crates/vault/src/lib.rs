//! Credential caching, resolution, and the live connection registry.

pub mod codec;
pub mod env;
pub mod registry;
pub mod resolver;
pub mod store;

/// Obfuscation strategies for cached secrets.
pub use codec::Codec;
/// Environment sources with case-insensitive multi-name lookup.
pub use env::{EnvSource, MapEnv, ProcessEnv};
/// Atomic owner of the live backend handle.
pub use registry::ConnectionRegistry;
/// Config source resolver.
pub use resolver::{ConfigResolver, ResolvedKey, is_placeholder_key, validate_endpoint};
/// Local key/value stores.
pub use store::{FileStore, KeyValueStore, MemoryStore};
