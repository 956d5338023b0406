//! # liveview-core
//!
//! Foundation types shared by the liveview crates:
//!
//! - **Branded IDs**: `SessionId`, `ComponentId`, `RequestId` as newtypes
//! - **Wire protocol**: inbound client frames and outbound fragment/query frames
//! - **Errors**: `thiserror` enums for protocol, handler, query and session faults
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::{HandlerError, ProtocolError, QueryError, SessionError};
pub use ids::{ComponentId, RequestId, SessionId};
