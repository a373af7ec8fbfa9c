//! testrig CLI
//!
//! Report rendering for the `run-tests` binary.

pub mod output;
