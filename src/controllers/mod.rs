//! Controladores de sesión
//!
//! Proyecciones por cliente sobre el store: cada controlador se suscribe
//! a un único registro (o a la bandeja de ofertas del conductor) y
//! entrega a la presentación un conjunto cerrado de estados.

pub mod driver_controller;
pub mod projection;
pub mod rider_controller;

mod session;

pub use driver_controller::{DriverSessionController, OfferEvent};
pub use projection::{project, RideView};
pub use rider_controller::RiderSessionController;
