//! Suscripción con ámbito a un booking concreto
//!
//! Pieza común de los controladores de sesión: bombea snapshots del store
//! hacia la presentación como `RideView`, deduplicando vistas consecutivas
//! iguales y suprimiendo cualquier cosa posterior a una vista terminal
//! (una resuscripción tras reconexión no vuelve a entregar un terminal ya
//! observado). La suscripción se libera explícitamente en el teardown.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::projection::{project, RideView};
use crate::store::BookingStore;
use crate::utils::errors::DispatchError;

#[derive(Default)]
struct PumpState {
    last: Option<RideView>,
    terminal_seen: bool,
}

pub(crate) struct BookingWatch {
    store: BookingStore,
    booking_id: String,
    tx: mpsc::UnboundedSender<RideView>,
    state: Arc<Mutex<PumpState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BookingWatch {
    pub(crate) async fn attach(
        store: BookingStore,
        booking_id: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RideView>), DispatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watch = Self {
            store,
            booking_id: booking_id.to_string(),
            tx,
            state: Arc::new(Mutex::new(PumpState::default())),
            task: Mutex::new(None),
        };
        watch.resubscribe().await?;
        Ok((watch, rx))
    }

    /// Idempotente: reengancha el listener tras una reconexión. El estado
    /// de deduplicación sobrevive, así que el snapshot inicial repetido
    /// del store no produce vistas duplicadas ni terminales rancios.
    pub(crate) async fn resubscribe(&self) -> Result<(), DispatchError> {
        if self.state.lock().expect("pump state lock poisoned").terminal_seen {
            debug!(booking_id = %self.booking_id, "Sesión ya terminal, no se resuscribe");
            return Ok(());
        }

        let mut sub = self.store.subscribe_booking(&self.booking_id).await?;
        let tx = self.tx.clone();
        let state = self.state.clone();
        let booking_id = self.booking_id.clone();

        let handle = tokio::spawn(async move {
            while let Some(snapshot) = sub.next().await {
                let view = project(&snapshot);
                let (deliver, done) = {
                    let mut st = state.lock().expect("pump state lock poisoned");
                    if st.terminal_seen || st.last.as_ref() == Some(&view) {
                        (false, st.terminal_seen)
                    } else {
                        st.terminal_seen = view.is_terminal();
                        st.last = Some(view.clone());
                        (true, st.terminal_seen)
                    }
                };
                if deliver && tx.send(view).is_err() {
                    break;
                }
                if done {
                    debug!(booking_id = %booking_id, "Vista terminal entregada, liberando listener");
                    break;
                }
            }
            sub.close();
        });

        let previous = self
            .task
            .lock()
            .expect("pump task lock poisoned")
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    /// Libera el listener del store; garantizado en el teardown del
    /// controlador con independencia de cualquier ciclo de vida de UI.
    pub(crate) fn close(&self) {
        if let Some(task) = self.task.lock().expect("pump task lock poisoned").take() {
            task.abort();
        }
    }
}

impl Drop for BookingWatch {
    fn drop(&mut self) {
        self.close();
    }
}
