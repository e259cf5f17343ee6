pub mod api_source;
pub mod csv_source;

pub use api_source::{ApiProductExtractor, ApiSourceConfig};
pub use csv_source::{CsvCustomerExtractor, CsvSourceConfig};
