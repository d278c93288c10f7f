//! Data models for turnloop

pub mod activity;
pub mod configuration;
pub mod turn;

pub use activity::*;
pub use configuration::*;
pub use turn::*;
