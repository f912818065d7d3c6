pub mod commands;
pub mod config;

pub use commands::{render_graph, Client};
pub use config::{load_cli_settings, save_cli_settings, CliSettings, Scope};
