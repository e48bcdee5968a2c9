//! Fidelización: puntos y descuento del siguiente booking
//!
//! Todas las mutaciones usan la actualización condicional del store para
//! que el canje no pueda gastarse dos veces bajo sesiones concurrentes.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::DispatchConfig;
use crate::models::LoyaltyAccount;
use crate::store::BookingStore;
use crate::utils::errors::DispatchError;

#[derive(Clone)]
pub struct LoyaltyService {
    store: BookingStore,
    config: DispatchConfig,
}

impl LoyaltyService {
    pub fn new(store: BookingStore, config: DispatchConfig) -> Self {
        Self { store, config }
    }

    /// Cuenta del rider, o cuenta vacía si nunca acumuló puntos
    pub async fn account(&self, rider_id: &str) -> Result<LoyaltyAccount, DispatchError> {
        Ok(self.read(rider_id).await?.0)
    }

    /// Cuenta más el hecho de si existe ya en el store; una cuenta
    /// ausente se espera como `points = null` en la condición.
    async fn read(&self, rider_id: &str) -> Result<(LoyaltyAccount, bool), DispatchError> {
        match self.store.read_loyalty(rider_id).await? {
            Some(account) => Ok((account, true)),
            None => Ok((LoyaltyAccount::empty(rider_id), false)),
        }
    }

    /// Suma puntos tras un viaje completado. Conflictos con otra mutación
    /// concurrente se reintentan de forma acotada; si se agotan los
    /// intentos el premio se pierde con un warning, nunca se duplica.
    pub async fn award_points(&self, rider_id: &str, points: i64) -> Result<(), DispatchError> {
        for _ in 0..3 {
            let (account, exists) = self.read(rider_id).await?;

            let mut expected = Map::new();
            expected.insert("points".into(), expected_points(&account, exists));
            let mut changes = Map::new();
            changes.insert("rider_id".into(), Value::String(rider_id.to_string()));
            changes.insert("points".into(), Value::from(account.points + points));

            if self
                .store
                .conditional_update_loyalty(rider_id, expected, changes)
                .await?
            {
                info!(rider_id, points, "🎁 Puntos de fidelización sumados");
                return Ok(());
            }
        }
        warn!(rider_id, points, "No se pudieron sumar puntos tras varios intentos");
        Ok(())
    }

    /// Canjea puntos por un descuento pendiente para el siguiente booking.
    /// Falla sin mutar nada si no hay puntos suficientes o si ya hay un
    /// descuento programado.
    pub async fn redeem_discount(&self, rider_id: &str) -> Result<LoyaltyAccount, DispatchError> {
        let (account, exists) = self.read(rider_id).await?;

        if account.next_booking_discount_percent.is_some() {
            return Err(DispatchError::DiscountAlreadyPending(rider_id.to_string()));
        }
        if account.points < self.config.loyalty_redemption_cost {
            return Err(DispatchError::InsufficientPoints {
                have: account.points,
                need: self.config.loyalty_redemption_cost,
            });
        }

        let mut expected = Map::new();
        expected.insert("points".into(), expected_points(&account, exists));
        expected.insert("next_booking_discount_percent".into(), Value::Null);
        let mut changes = Map::new();
        changes.insert("rider_id".into(), Value::String(rider_id.to_string()));
        changes.insert(
            "points".into(),
            Value::from(account.points - self.config.loyalty_redemption_cost),
        );
        changes.insert(
            "next_booking_discount_percent".into(),
            Value::from(self.config.loyalty_discount_percent),
        );

        if self
            .store
            .conditional_update_loyalty(rider_id, expected, changes)
            .await?
        {
            info!(
                rider_id,
                discount = self.config.loyalty_discount_percent,
                "💳 Descuento canjeado"
            );
            return self.account(rider_id).await;
        }

        // Conflicto: otra sesión mutó la cuenta entre lectura y escritura
        let refreshed = self.account(rider_id).await?;
        if refreshed.next_booking_discount_percent.is_some() {
            Err(DispatchError::DiscountAlreadyPending(rider_id.to_string()))
        } else {
            Err(DispatchError::StoreUnavailable(format!(
                "concurrent loyalty update for rider {}",
                rider_id
            )))
        }
    }

    /// Consume y limpia el descuento pendiente, si existe. Usado por la
    /// creación del booking; la condición garantiza consumo único aunque
    /// dos creaciones lo intenten a la vez.
    pub async fn take_pending_discount(
        &self,
        rider_id: &str,
    ) -> Result<Option<f64>, DispatchError> {
        let account = self.account(rider_id).await?;
        let Some(discount) = account.next_booking_discount_percent else {
            return Ok(None);
        };

        let mut expected = Map::new();
        expected.insert("next_booking_discount_percent".into(), Value::from(discount));
        let mut changes = Map::new();
        changes.insert("next_booking_discount_percent".into(), Value::Null);

        if self
            .store
            .conditional_update_loyalty(rider_id, expected, changes)
            .await?
        {
            Ok(Some(discount))
        } else {
            // Otro consumo ganó la carrera; este booking va sin descuento
            Ok(None)
        }
    }

    /// Devuelve un descuento consumido cuya creación de booking falló.
    /// Condicional: si mientras tanto apareció otro descuento pendiente,
    /// no se pisa y la devolución se descarta con un warning.
    pub async fn restore_pending_discount(
        &self,
        rider_id: &str,
        discount: f64,
    ) -> Result<(), DispatchError> {
        let mut expected = Map::new();
        expected.insert("next_booking_discount_percent".into(), Value::Null);
        let mut changes = Map::new();
        changes.insert("next_booking_discount_percent".into(), Value::from(discount));

        if !self
            .store
            .conditional_update_loyalty(rider_id, expected, changes)
            .await?
        {
            warn!(rider_id, discount, "Descuento no devuelto: la cuenta ya tiene otro pendiente");
        }
        Ok(())
    }
}

fn expected_points(account: &LoyaltyAccount, exists: bool) -> Value {
    if exists {
        Value::from(account.points)
    } else {
        Value::Null
    }
}
