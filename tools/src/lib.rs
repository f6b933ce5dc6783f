pub mod config;
pub mod logging;

pub use config::ToolConfig;
pub use logging::init_logging;
