//! Conversation-memory providers.
//!
//! Implementations of the core [`axon_core::memory::MemoryProvider`] trait:
//!
//! - [`InMemoryProvider`] — process-local, useful for testing and sessions
//!   where persistence isn't needed
//! - [`FileProvider`] — JSONL file persistence with atomic rewrites
//!
//! Network-backed providers (key-value stores, document stores) implement
//! the same trait outside this workspace.
//!
//! All providers keep history in insertion order (oldest first), trim
//! oldest-first when a history cap is set, and rewrite history atomically
//! during compression.

mod compress;
mod file_backend;
mod in_memory;

pub use file_backend::FileProvider;
pub use in_memory::InMemoryProvider;
