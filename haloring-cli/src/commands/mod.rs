//! Command implementations, one module per role.

pub mod broker;
pub mod controller;
pub mod worker;
