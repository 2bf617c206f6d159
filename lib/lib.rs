pub mod build_info;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod logging;
pub mod outbox;
pub mod remote;
pub mod sync_service;
