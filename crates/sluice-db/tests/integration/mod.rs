pub mod common;
mod order_source_tests;
