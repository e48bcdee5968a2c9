//! Controlador de sesión del conductor
//!
//! Mientras está libre, el conductor escucha su lista de ofertas; una vez
//! reclamado un booking, observa ese registro con la misma maquinaria que
//! el rider. El registro de presencia se limpia vía on-disconnect si la
//! conexión se cae de golpe.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::session::BookingWatch;
use super::RideView;
use crate::models::DriverOffer;
use crate::store::BookingStore;
use crate::utils::errors::DispatchError;

/// Evento de la bandeja de ofertas del conductor
#[derive(Debug, Clone)]
pub enum OfferEvent {
    /// Oferta nueva (o presente al suscribirse)
    Offered(DriverOffer),
    /// La oferta desapareció: aceptada por otro, expirada o cancelada
    Withdrawn { booking_id: String },
}

pub struct DriverSessionController {
    store: BookingStore,
    driver_id: String,
    offers_task: Mutex<Option<JoinHandle<()>>>,
    booking_watch: Mutex<Option<Arc<BookingWatch>>>,
}

impl DriverSessionController {
    /// Marca presencia (con limpieza on-disconnect) y se suscribe a la
    /// bandeja de ofertas del conductor.
    pub async fn attach(
        store: BookingStore,
        driver_id: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<OfferEvent>), DispatchError> {
        store.mark_driver_online(driver_id).await?;

        let mut offers = store.subscribe_offers(driver_id).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task_driver = driver_id.to_string();
        let offers_task = tokio::spawn(async move {
            while let Some(event) = offers.next().await {
                let mapped = match event.value {
                    None => OfferEvent::Withdrawn {
                        booking_id: event.key,
                    },
                    Some(raw) => match serde_json::from_value::<DriverOffer>(raw) {
                        Ok(offer) => OfferEvent::Offered(offer),
                        Err(e) => {
                            warn!(driver_id = %task_driver, key = %event.key, error = %e,
                                "Oferta indecodificable, se omite");
                            continue;
                        }
                    },
                };
                if tx.send(mapped).is_err() {
                    break;
                }
            }
            offers.close();
        });

        Ok((
            Self {
                store,
                driver_id: driver_id.to_string(),
                offers_task: Mutex::new(Some(offers_task)),
                booking_watch: Mutex::new(None),
            },
            rx,
        ))
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    /// Tras ganar el claim: observa el booking asignado. Sustituye
    /// cualquier observación anterior.
    pub async fn watch_booking(
        &self,
        booking_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<RideView>, DispatchError> {
        let (watch, views) = BookingWatch::attach(self.store.clone(), booking_id).await?;
        let previous = self
            .booking_watch
            .lock()
            .expect("booking watch lock poisoned")
            .replace(Arc::new(watch));
        if let Some(previous) = previous {
            previous.close();
        }
        Ok(views)
    }

    /// Reengancha la observación del booking tras una reconexión. El watch
    /// se clona fuera del lock, así que un `watch_booking` concurrente
    /// nunca se pierde al devolverlo.
    pub async fn resubscribe(&self) -> Result<(), DispatchError> {
        let watch = self
            .booking_watch
            .lock()
            .expect("booking watch lock poisoned")
            .clone();
        let Some(watch) = watch else {
            return Ok(());
        };
        watch.resubscribe().await
    }

    /// Libera todos los listeners de la sesión
    pub fn close(&self) {
        if let Some(task) = self
            .offers_task
            .lock()
            .expect("offers task lock poisoned")
            .take()
        {
            task.abort();
        }
        if let Some(watch) = self
            .booking_watch
            .lock()
            .expect("booking watch lock poisoned")
            .take()
        {
            watch.close();
        }
    }
}

impl Drop for DriverSessionController {
    fn drop(&mut self) {
        self.close();
    }
}
