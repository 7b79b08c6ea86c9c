//! Core value types shared by every pipeline step.
//!
//! This module contains:
//! - The untyped `Args` bundle threaded between steps
//! - The `args!` construction macro

mod args;

pub use args::{Args, Value};
