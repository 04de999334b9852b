//! Terminal chat client for a remote Ollama inference server.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod core;
pub mod display;
pub mod history;
pub mod input;
pub mod session;
pub mod stream;
pub mod transport;
