//! threadport - import and export engine for comment-hosting data
//!
//! This crate provides the core functionality for the `tport` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Canonical records (Site, Page, Comment, User)
//! - [`storage`] - SQLite record store
//! - [`transfer`] - Format adapters, import executor, export serializer
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod transfer;

pub use error::{Error, Result};
