//! Cálculo de tarifas
//!
//! Función pura y determinista: sin I/O, sin estado. El motor de ciclo de
//! vida la invoca al completar el viaje con las tarifas congeladas en el
//! registro al momento de crearlo.

use crate::utils::errors::DispatchError;

/// `subtotal = base + per_km*distancia + per_minute*duración`, después
/// el descuento porcentual opcional, con suelo en cero.
pub fn compute_fare(
    base: f64,
    per_km_rate: f64,
    distance_km: f64,
    per_minute_rate: f64,
    duration_minutes: f64,
    discount_percent: Option<f64>,
) -> Result<f64, DispatchError> {
    for (name, value) in [
        ("base", base),
        ("per_km_rate", per_km_rate),
        ("distance_km", distance_km),
        ("per_minute_rate", per_minute_rate),
        ("duration_minutes", duration_minutes),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(DispatchError::InvalidFareInput(format!(
                "{} must be a non-negative finite number, got {}",
                name, value
            )));
        }
    }

    let discount = discount_percent.unwrap_or(0.0);
    if !discount.is_finite() || !(0.0..=100.0).contains(&discount) {
        return Err(DispatchError::InvalidFareInput(format!(
            "discount_percent must be within 0..=100, got {}",
            discount
        )));
    }

    let subtotal = base + per_km_rate * distance_km + per_minute_rate * duration_minutes;
    let amount = subtotal * (1.0 - discount / 100.0);
    Ok(amount.max(0.0))
}

/// Estimación mostrada en la oferta: misma fórmula, sin descuento aplicado
/// todavía (el descuento pendiente se congela al crear el booking).
pub fn estimate_fare(
    base: f64,
    per_km_rate: f64,
    distance_km: f64,
    per_minute_rate: f64,
    duration_minutes: f64,
) -> Result<f64, DispatchError> {
    compute_fare(
        base,
        per_km_rate,
        distance_km,
        per_minute_rate,
        duration_minutes,
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fare_formula_with_discount() {
        // (40 + 12*5 + 2*15) * 0.9 = 117.0
        let fare = compute_fare(40.0, 12.0, 5.0, 2.0, 15.0, Some(10.0)).unwrap();
        assert!((fare - 117.0).abs() < 1e-9);
    }

    #[test]
    fn test_fare_without_discount() {
        let fare = compute_fare(40.0, 12.0, 5.0, 2.0, 15.0, None).unwrap();
        assert!((fare - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_matches_undiscounted_fare() {
        let estimate = estimate_fare(40.0, 12.0, 5.0, 2.0, 15.0).unwrap();
        let fare = compute_fare(40.0, 12.0, 5.0, 2.0, 15.0, None).unwrap();
        assert!((estimate - fare).abs() < 1e-9);
    }

    #[test]
    fn test_full_discount_floors_at_zero() {
        let fare = compute_fare(10.0, 1.0, 2.0, 1.0, 3.0, Some(100.0)).unwrap();
        assert_eq!(fare, 0.0);
    }

    #[test]
    fn test_negative_inputs_rejected() {
        assert!(matches!(
            compute_fare(-1.0, 12.0, 5.0, 2.0, 15.0, None),
            Err(DispatchError::InvalidFareInput(_))
        ));
        assert!(matches!(
            compute_fare(40.0, 12.0, -0.1, 2.0, 15.0, None),
            Err(DispatchError::InvalidFareInput(_))
        ));
    }

    #[test]
    fn test_out_of_range_discount_rejected() {
        assert!(matches!(
            compute_fare(40.0, 12.0, 5.0, 2.0, 15.0, Some(120.0)),
            Err(DispatchError::InvalidFareInput(_))
        ));
        assert!(matches!(
            compute_fare(40.0, 12.0, 5.0, 2.0, 15.0, Some(-5.0)),
            Err(DispatchError::InvalidFareInput(_))
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(matches!(
            compute_fare(f64::NAN, 12.0, 5.0, 2.0, 15.0, None),
            Err(DispatchError::InvalidFareInput(_))
        ));
        assert!(matches!(
            compute_fare(40.0, f64::INFINITY, 5.0, 2.0, 15.0, None),
            Err(DispatchError::InvalidFareInput(_))
        ));
    }
}
