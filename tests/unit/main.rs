//! Unit tests for public models and helpers.

mod builders_test;
mod config_test;
mod error_test;
mod runtime_test;
mod util_test;
