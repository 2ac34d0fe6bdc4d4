//! # courier-shared
//!
//! Identifier newtypes, domain enums and timing constants shared by every
//! crate of the Courier synchronization core. This crate performs no I/O.

pub mod constants;
pub mod time;
pub mod types;
