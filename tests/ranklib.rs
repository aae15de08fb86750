//! Integration tests for the training engine.
//!
//! Grouped under one test binary so the `tests/` root stays tidy.

mod common;

#[path = "ranklib/samples.rs"]
mod samples;

#[path = "ranklib/train_and_serve.rs"]
mod train_and_serve;

#[path = "ranklib/reproducibility.rs"]
mod reproducibility;
