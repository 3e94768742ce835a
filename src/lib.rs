// src/lib.rs

//! feedwatch library
//!
//! Harvests posts and comments for monitored accounts and tags on a
//! remote social platform into a document store, deduplicated and
//! incrementally refreshed.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
