//! Quetzal save files: the portable IFF/IFZS snapshot format
//!
//! A save is dynamic memory (usually XOR-delta compressed against the
//! original story), the full call stack, and the PC, wrapped in IFF chunks.
//! The storage host moves the bytes; nothing here touches a filesystem.

pub mod chunks;
pub mod cmem;
pub mod iff;
pub mod snapshot;

pub use snapshot::{from_quetzal, to_quetzal, Snapshot};
