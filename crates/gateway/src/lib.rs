//! Gateway side of a deployment.
//!
//! [`GatewayConfigurator`] brings an API's resource tree in line with the
//! function's declared routes (or a single catch-all proxy) and deploys the
//! stage named after the alias. A digest of the declared configuration can
//! be stored on the stage so unchanged configurations skip the resync.

pub mod configurator;
pub mod digest;
pub mod error;

pub use configurator::{
    GatewayConfigurator, GatewayMode, GatewayRequest, GatewayUpdate, VERSION_VARIABLE,
    integration_uri, stage_url,
};
pub use digest::config_digest;
pub use error::GatewayError;
