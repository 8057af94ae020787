//! Event store test suite
//!
//! Key layout, planning, save/query/count/delete and store lifecycle tests.

mod common;

mod keys_tests;
