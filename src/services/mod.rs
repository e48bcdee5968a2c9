//! Services module
//!
//! Este módulo contiene la lógica de negocio del núcleo: el motor de
//! ciclo de vida, el notificador de despacho, tarifas, fidelización y
//! archivo de viajes.

pub mod dispatch_service;
pub mod fare_service;
pub mod history_service;
pub mod lifecycle_service;
pub mod loyalty_service;

pub use dispatch_service::{DispatchService, DriverSelection, FixedCandidates};
pub use fare_service::{compute_fare, estimate_fare};
pub use history_service::HistoryService;
pub use lifecycle_service::{LifecycleService, CANCEL_REASON_DRIVER, CANCEL_REASON_USER};
pub use loyalty_service::LoyaltyService;
