//! map-service: create/read/delete over a single MongoDB collection, served
//! only while the store connection is ready.
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
