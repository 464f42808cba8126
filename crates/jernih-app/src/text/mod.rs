//! Text utilities kept pure for reuse across services and pipelines.
//!
//! Functions and types exposed here must remain side-effect free so the
//! cleansing pipeline can be shared across request handlers without locking
//! and tested without any storage behind it.

pub mod artifacts;
pub mod correct;
pub mod encoding;
pub mod filter;
pub mod normalize;

pub use artifacts::strip_encoding_artifacts;
pub use correct::correct;
pub use encoding::decode_latin1;
pub use filter::{AbusiveFilter, LITERAL_REMOVALS, MalformedPatternError};
pub use normalize::normalize;
