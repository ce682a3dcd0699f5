//! CLI Commands

pub mod workspace;
