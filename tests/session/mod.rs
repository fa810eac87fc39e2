//! Session persistence tests.

mod store_test;
