// src/handlers/mod.rs

pub mod badges;
pub mod progress;
