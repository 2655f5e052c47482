//! Durable counter backends for identifier sequences.

pub mod file;
pub mod memory;

pub use file::FileCounter;
pub use memory::InMemoryCounter;
