pub mod commands;

pub use commands::{build_manager, load_config, Overrides};
