pub mod machine;
pub mod runtime_error;

pub use machine::{Machine, MachineConfig, format_stack};
pub use runtime_error::RuntimeError;
