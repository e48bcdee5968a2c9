//! Clients - HTTP Clients for External APIs
//!
//! This module contains HTTP clients for communicating with external APIs.

pub mod mapping_client;

// Re-export main types for convenience
pub use mapping_client::{MapboxDirectionsClient, RouteEstimate, RouteEstimator, StraightLineEstimator};
