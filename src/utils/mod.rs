//!
//! Formatting helpers shared by the library and the binary.
pub mod index;

pub use index::format_token_amount;
