//! Shared fixtures for cross-component scenarios.

pub mod harness;

#[cfg(test)]
mod unit;
