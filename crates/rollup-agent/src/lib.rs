//! Rollup agent - HTTP host for the circuit rollup engine

pub mod api;
pub mod config;
