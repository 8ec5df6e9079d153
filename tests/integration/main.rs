//! Integration tests for catalog-harvest
//!
//! These tests drive full runs through an in-memory scripted renderer and
//! check what lands in the CSV output.

mod harvest_tests;
mod support;
