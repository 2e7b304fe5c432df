//! Property-based tests for mbqe-math

mod engine_properties;
