// src/utils/mod.rs

//! Shared utilities.

pub mod time;

pub use time::{days_to_secs, unix_now};
