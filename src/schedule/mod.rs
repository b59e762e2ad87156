//! Blocking schedule model and decoding
//!
//! A schedule lists recurring weekly windows and one-off periods during
//! which device MAC addresses lose network access. Evaluating it at an
//! instant yields the `BlockedSet` for that moment.

pub mod decode;
pub mod model;

pub use decode::decode_schedule;
pub use model::{BlockedSet, Schedule};
