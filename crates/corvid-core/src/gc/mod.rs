//! Garbage collection system
//!
//! Objects are stored in an index arena and referenced by [`ObjRef`]
//! handles, so there is no raw-pointer header.
//!
//! # Architecture
//!
//! - **Heap**: slot arena with a free list and per-slot mark bits
//! - **RootSet**: stack roots gathered before each collection, plus scoped
//!   temporary roots for objects still under construction
//! - **GarbageCollector**: mark-sweep over classes, instances and opaque
//!   instances, triggered by live object count
//!
//! [`ObjRef`]: crate::value::ObjRef

mod collector;
mod heap;
mod roots;

pub use collector::{GarbageCollector, GcStats, HeapStats};
pub use heap::Heap;
pub use roots::RootSet;
