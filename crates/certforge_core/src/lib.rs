pub mod config;
pub mod files;
pub mod logging;

pub use config::ForgeConfig;
pub use files::{DATA_EXTENSIONS, TEMPLATE_EXTENSIONS, allowed_file, check_upload};
