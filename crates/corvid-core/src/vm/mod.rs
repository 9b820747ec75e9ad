//! Virtual machine: class construction, dispatch and execution

mod bootstrap;
mod class;
mod field;
mod interpreter;
mod options;

pub use bootstrap::CoreClasses;
pub use interpreter::Vm;
pub use options::VmOptions;

/// Reserved method signature holding an opaque class's allocator
pub const ALLOCATE_SIGNATURE: &str = "<allocate>";
