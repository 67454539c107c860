//! Startup optimization engine.
//!
//! Inventories every autorun surface of the machine, classifies each entry
//! against a keyword safety policy and reversibly disables the entries the
//! policy marks for removal, where policy and privilege allow it.

pub mod startup;
