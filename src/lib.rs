//! Núcleo de orquestación de bookings y matching de conductores
//!
//! Biblioteca consumida por la capa de presentación (excluida de este
//! repo): la UI solo renderiza las proyecciones de los controladores de
//! sesión y emite los comandos del motor de ciclo de vida. La
//! coordinación entre rider y conductor pasa entera por el store en
//! tiempo real; no hay memoria compartida entre procesos de cliente.

pub mod clients;
pub mod config;
pub mod controllers;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::DispatchConfig;
pub use controllers::{DriverSessionController, OfferEvent, RideView, RiderSessionController};
pub use models::{BookingRecord, BookingStatus, DriverOffer, GeoPoint, LoyaltyAccount, Rating};
pub use services::{DispatchService, DriverSelection, HistoryService, LifecycleService, LoyaltyService};
pub use store::{BookingStore, MemoryStore, StoreClient, StoreError};
pub use utils::DispatchError;
