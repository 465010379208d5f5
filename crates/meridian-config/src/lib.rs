//! Ambient configuration concerns: loading user-supplied parameter files,
//! merging the `--vars` overlay, computing the fingerprints Invariant I2
//! relies on, and the socks-proxy passthrough.

mod error;
mod fingerprint;
mod params;
mod recognized;
mod service_params;

pub use error::ConfigError;
pub use fingerprint::{provider_fingerprint, variable_fingerprint};
pub use params::{load_parameters, merge_vars, parse_vars_flag, require, UserVariables};
pub use recognized::recognized_variables;
pub use service_params::ServiceParams;
