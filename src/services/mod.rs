// src/services/mod.rs

pub mod badges;
pub mod progress;

pub use badges::{BadgeService, StudentContact};
pub use progress::ProgressService;
