//! Storage test suite
//!
//! SSTable format and storage manager tests.

mod sstable_tests;
