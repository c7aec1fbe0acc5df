//! CLI command implementations.

pub mod inspect;
pub mod package;
pub mod sync;
pub mod verify;
