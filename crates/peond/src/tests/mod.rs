//! Test suites for the lifecycle manager.

mod support;
