// Re-export all items from the submodules
mod compression_method;
mod output_config;

pub use compression_method::CompressionMethod;
pub use output_config::{default_base_path, OutputConfig};
