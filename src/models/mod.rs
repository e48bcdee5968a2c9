//! Modelos del sistema
//!
//! Este módulo contiene todos los modelos de datos que mapean exactamente
//! al schema lógico del store en tiempo real.

pub mod booking;
pub mod loyalty;
pub mod offer;
pub mod rating;

pub use booking::{BookingRecord, BookingStatus, GeoPoint};
pub use loyalty::LoyaltyAccount;
pub use offer::DriverOffer;
pub use rating::Rating;
