//! Cuenta de fidelización del rider
//!
//! Mantiene puntos acumulados y como máximo un descuento pendiente para el
//! siguiente booking. El canje y el consumo usan actualizaciones
//! condicionales para evitar el doble gasto.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyAccount {
    pub rider_id: String,
    pub points: i64,
    pub next_booking_discount_percent: Option<f64>,
}

impl LoyaltyAccount {
    pub fn empty(rider_id: &str) -> Self {
        Self {
            rider_id: rider_id.to_string(),
            points: 0,
            next_booking_discount_percent: None,
        }
    }
}
