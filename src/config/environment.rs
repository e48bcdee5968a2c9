//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y las constantes
//! de despacho (tarifas, ventana de ofertas, fidelización).

use std::env;

/// Configuración del núcleo de despacho
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Tarifa base en unidades de moneda
    pub fare_base: f64,
    /// Tarifa por kilómetro
    pub per_km_rate: f64,
    /// Tarifa por minuto
    pub per_minute_rate: f64,
    /// Ventana de búsqueda de conductores antes de NO_DRIVERS (segundos)
    pub offer_timeout_secs: u64,
    /// Máximo de conductores solicitados por booking
    pub max_offer_candidates: usize,
    /// Intervalo de actualización de ubicación durante el viaje (segundos)
    pub location_update_interval_secs: u64,
    /// Puntos necesarios para canjear un descuento
    pub loyalty_redemption_cost: i64,
    /// Porcentaje de descuento otorgado al canjear
    pub loyalty_discount_percent: f64,
    /// Puntos otorgados por viaje completado
    pub loyalty_points_per_trip: i64,
    pub mapbox_token: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fare_base: 40.0,
            per_km_rate: 12.0,
            per_minute_rate: 2.0,
            offer_timeout_secs: 30,
            max_offer_candidates: 5,
            location_update_interval_secs: 7,
            loyalty_redemption_cost: 100,
            loyalty_discount_percent: 10.0,
            loyalty_points_per_trip: 10,
            mapbox_token: None,
        }
    }
}

impl DispatchConfig {
    /// Carga la configuración desde variables de entorno, con los valores
    /// de `Default` como respaldo para cada campo ausente o inválido.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            fare_base: env_f64("DISPATCH_FARE_BASE", defaults.fare_base),
            per_km_rate: env_f64("DISPATCH_PER_KM_RATE", defaults.per_km_rate),
            per_minute_rate: env_f64("DISPATCH_PER_MINUTE_RATE", defaults.per_minute_rate),
            offer_timeout_secs: env_u64("DISPATCH_OFFER_TIMEOUT_SECS", defaults.offer_timeout_secs),
            max_offer_candidates: env_u64(
                "DISPATCH_MAX_OFFER_CANDIDATES",
                defaults.max_offer_candidates as u64,
            ) as usize,
            location_update_interval_secs: env_u64(
                "DISPATCH_LOCATION_INTERVAL_SECS",
                defaults.location_update_interval_secs,
            ),
            loyalty_redemption_cost: env_u64(
                "DISPATCH_LOYALTY_REDEMPTION_COST",
                defaults.loyalty_redemption_cost as u64,
            ) as i64,
            loyalty_discount_percent: env_f64(
                "DISPATCH_LOYALTY_DISCOUNT_PERCENT",
                defaults.loyalty_discount_percent,
            ),
            loyalty_points_per_trip: env_u64(
                "DISPATCH_LOYALTY_POINTS_PER_TRIP",
                defaults.loyalty_points_per_trip as u64,
            ) as i64,
            mapbox_token: env::var("MAPBOX_TOKEN").ok(),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.offer_timeout_secs, 30);
        assert_eq!(config.max_offer_candidates, 5);
        assert_eq!(config.loyalty_redemption_cost, 100);
        assert!((config.loyalty_discount_percent - 10.0).abs() < f64::EPSILON);
    }
}
