//! Property-based tests for mbqe-core

mod projection_properties;
