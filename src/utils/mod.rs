pub mod comet_toml;
pub mod config;
pub mod logger;
pub mod patterns;
pub mod settings;

pub use comet_toml::{load_config, parse_config, resolve_env_vars};
pub use config::*;
pub use logger::{set_verbose, setup_logging};
pub use patterns::{ItemFilter, compile_globs, glob_to_regex};
pub use settings::*;
