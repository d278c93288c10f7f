//! Services shared across the library

pub mod logging;
