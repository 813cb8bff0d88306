//! quickchat_utils
//!
//! Small shared helpers used by the binary and the test suites of the other
//! crates. Currently this is only the tracing bootstrap.

pub mod logging;
