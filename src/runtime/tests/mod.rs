//! Tests for the runtime
//!
//! Organized by feature area

mod async_tests;
mod environment_tests;
mod helpers;
mod vm_tests;
