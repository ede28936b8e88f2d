//! Unit test modules.

mod envelope_test;
mod library_test;
mod routine_test;
