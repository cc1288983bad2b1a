// src/pipeline/mod.rs

pub mod accumulator;
pub mod chunking;
pub mod normalizer;
pub mod readers;
pub mod writers;
