//! Integration test modules.

mod config_test;
mod scheduler_test;
mod stop_test;
