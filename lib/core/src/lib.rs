//! Core domain types and utilities for flowpatch.
//!
//! This crate provides the identifier types and error handling foundation
//! shared by the workflow patch engine and the command-line front end.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{DocumentId, NodeId};
