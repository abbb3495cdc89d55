pub mod backup;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod planner;
pub mod reindexer;
pub mod reporter;
