pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod scope;
pub mod services;
pub mod tenancy;

#[cfg(test)]
pub mod testing;
