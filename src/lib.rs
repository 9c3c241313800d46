//! Shared pieces of the `wiener-hv` command line tools.

pub mod args;
pub mod logging;
