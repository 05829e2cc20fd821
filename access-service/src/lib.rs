//! Access Service - credential lifecycle and checkpoint validation for facility access.

pub mod config;
pub mod models;
pub mod services;
pub mod startup;
