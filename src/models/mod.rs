// src/models/mod.rs

pub mod attempt;
pub mod complexity;
pub mod problem;
pub mod stats;
pub mod submission;
