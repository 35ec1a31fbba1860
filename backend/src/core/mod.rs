//! Core clock and lifecycle primitives

pub mod state;
pub mod time;
