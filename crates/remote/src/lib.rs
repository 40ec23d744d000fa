//! Remote collaborator seams for the deployment pipeline.
//!
//! The pipeline never talks to a cloud SDK directly. It consumes the four
//! traits in [`store`], wraps every call in [`retry::with_retry`] and records
//! stages and calls through a [`log::CallLog`]. The `memory` feature adds an
//! in-memory platform with the same semantics for tests and dry runs.

pub mod log;
#[cfg(feature = "memory")]
pub mod memory;
pub mod retry;
pub mod store;

pub use log::{CallLog, RecordingLog, TracingLog};
pub use retry::{RetryPolicy, with_retry};
pub use store::{
    CallerIdentity, FunctionStore, GatewayStore, IdentityProvider, ObjectStore, Platform,
    RemoteFuture,
};
