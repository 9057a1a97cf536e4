//! # FoodBridge API Server Library
//!
//! HTTP surface for the food-donation platform: donors list surplus food,
//! NGOs verify and claim it, volunteers carry it from donor to recipient.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration from environment variables
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request extractors that reject with the error envelope
//! - `middleware`: Security headers and rate limiting
//! - `notify`: Best-effort notifications for lifecycle events
//! - `response`: Success envelope and pagination
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod notify;
pub mod response;
pub mod routes;
