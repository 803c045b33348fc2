//! Engine-API Client. `spec.md` §4.C.

mod client;
mod jwt;
mod types;

pub use client::{EngineClient, PayloadFields};
pub use jwt::JwtAuth;
pub use types::{EngineApiVersion, ExecutionRequests, PayloadId, PayloadStatusKind};

pub use client::Error;
