pub mod api;
pub mod canvas;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod outlook;
pub mod services;
pub mod state;
pub mod sync;
