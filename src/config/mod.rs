mod error;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use types::{ClientSettings, HarnessConfig, LinkSettings, ServerSettings};
