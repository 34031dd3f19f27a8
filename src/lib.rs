pub mod cli;
pub mod commands;
pub mod domain;
pub mod error;
pub mod services;
