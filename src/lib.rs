//! Photo IA backend
//!
//! Stores uploaded photos under sequential names, generates AI variants through
//! a configurable provider (Apiframe or Runway), frames the result and keeps
//! the public URLs in PostgreSQL and S3-compatible storage.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
