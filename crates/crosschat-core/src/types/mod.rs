//! Core types for CrossChat.

mod delivery;
mod identifiers;
mod registration;
mod tier;

pub use delivery::*;
pub use identifiers::*;
pub use registration::*;
pub use tier::*;
