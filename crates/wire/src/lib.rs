//! Self-describing wire presentation codec.
//!
//! Maps application values onto a JSON-compatible structure with tagged
//! representations for timestamps, regular expressions, binary data,
//! non-finite numbers, and application-registered custom types, and defines
//! the envelope shapes (`method`, `result`, `event`, `error`, `setup`) used
//! uniformly across the transport.

mod envelope;
mod error;
mod value;

pub use envelope::{Envelope, FieldError};
pub use error::CodecError;
pub use value::{NonFinite, Value, MAX_DEPTH};
