//! Input table schema
//!
//! Typed rows for the four upstream tables, parsing from JSON and NDJSON,
//! and the [`TableSource`] seam to whatever retrieves them.

mod adapter;
mod source;
mod tables;

pub use adapter::*;
pub use source::*;
pub use tables::*;
