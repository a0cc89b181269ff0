pub mod assemble;
pub mod avi;
pub mod scan;

pub use assemble::{assemble, AssembleError, AssembleOptions, AssemblyReport};
