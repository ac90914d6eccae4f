// src/models/mod.rs

pub mod badge;
pub mod catalog;
pub mod progress;
