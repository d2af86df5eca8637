//! Driven adapters: implementations of the domain ports.

pub mod memory;

pub use self::memory::MemoryStore;
