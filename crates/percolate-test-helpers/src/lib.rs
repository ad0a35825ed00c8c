//! Test utilities and fixtures for Percolate
//!
//! This crate provides shared test helpers for the integration tests
//! (tests/ directory) of the core library and the command line tool.

pub mod bundle;
pub mod fixtures;
pub mod mocks;
