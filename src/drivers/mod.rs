//! Device driver contracts
//!
//! The scheduling core consumes platform services through the contracts in
//! this module; the drivers themselves live with their platforms.

pub mod base;
