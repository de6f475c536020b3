//! Shared utilities for the LIM compiler.
mod errors;
mod id;
mod namegenerator;
mod out_file;

pub use errors::{Error, LimResult};
pub use id::{GetName, Id};
pub use namegenerator::NameGenerator;
pub use out_file::OutputFile;
