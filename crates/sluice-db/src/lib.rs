pub mod config;
pub mod order_source;

pub use config::DatabaseSourceConfig;
pub use order_source::DatabaseOrderExtractor;
