// src/services.rs

pub mod analytics;
pub mod auth;
pub mod dashboard_service;
pub mod live;
pub mod session;
