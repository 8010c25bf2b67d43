//! Command modules for rddlock.
//!
//! Each module handles a category of operations.

pub mod lock;
pub mod run;
