//! Controlador de sesión del rider
//!
//! Proyección por cliente: se suscribe a exactamente un BookingRecord y
//! traduce los eventos del store al conjunto cerrado de estados de
//! presentación. Estado local poblado solo desde el último snapshot; el
//! booking-id llega explícito, sin singletons de ámbito de pantalla.

use tokio::sync::mpsc;

use super::session::BookingWatch;
use super::RideView;
use crate::store::BookingStore;
use crate::utils::errors::DispatchError;

pub struct RiderSessionController {
    booking_id: String,
    watch: BookingWatch,
}

impl RiderSessionController {
    /// Engancha la sesión al booking y devuelve el canal de vistas que
    /// consume la presentación.
    pub async fn attach(
        store: BookingStore,
        booking_id: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RideView>), DispatchError> {
        let (watch, views) = BookingWatch::attach(store, booking_id).await?;
        Ok((
            Self {
                booking_id: booking_id.to_string(),
                watch,
            },
            views,
        ))
    }

    pub fn booking_id(&self) -> &str {
        &self.booking_id
    }

    /// Reengancha tras una reconexión; no reentrega terminales ya vistos
    pub async fn resubscribe(&self) -> Result<(), DispatchError> {
        self.watch.resubscribe().await
    }

    /// Teardown explícito del listener
    pub fn close(&self) {
        self.watch.close();
    }
}
