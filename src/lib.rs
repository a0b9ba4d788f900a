//! Library crate for netassert-rs: declarative port assertions driven by nmap.
pub mod assertion;
pub mod config;
pub mod error;
pub mod manifest;
pub mod nmap;
pub mod ports;
pub mod report;
pub mod results;
pub mod runner;
pub mod scanner;
pub mod types;

