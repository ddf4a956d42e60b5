//! Stem Splitter
//!
//! Core of the stem separation service: uploads become separation jobs that
//! run on background worker threads, report progress while they advance
//! through their phases, and leave one WAV file per stem behind.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
