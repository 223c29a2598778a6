//! Flat Store - line-oriented key/value file
//!
//! One entry per line, `<key> = <value>`, where the value is either a
//! 64-bit integer literal or a single text token:
//!
//! ```text
//! 1234.xp = 5400
//! 1234.level = 12
//! motd = welcome
//! ```

pub mod scalar;
pub mod store;

pub use scalar::Scalar;
pub use store::FlatStore;

/// Extension appended to a store name to form its file path
pub const FILE_EXTENSION: &str = "toml";
