pub mod health;
pub mod invoke;
pub mod manifest;

pub use health::*;
pub use invoke::*;
pub use manifest::*;
