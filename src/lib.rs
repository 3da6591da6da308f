//! Workspace facade: re-exports the pieces that make up the real-time hub
//! so a single `realtime_hub::` import covers the connection/session layer,
//! dispatcher, event subsystem, and wire codec.

pub use rt_core::*;
pub use server::{build_router, AppState};
pub use wire::{CodecError, Envelope, FieldError, Value};
