//! Database query functions organized by domain.

pub mod tiles;
pub mod users;
