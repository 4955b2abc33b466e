//! Crate-level scenario and property tests, run against the simulated CPU.

mod helpers;
