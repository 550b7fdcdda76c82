pub mod achievements;
pub mod engine;
pub mod error;
pub mod goals;
pub mod rank;
pub mod stats;
pub mod timeline;
pub mod window;
