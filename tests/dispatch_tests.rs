use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use ride_dispatch::models::{BookingStatus, GeoPoint};
use ride_dispatch::services::dispatch_service::FixedCandidates;
use ride_dispatch::{
    BookingStore, DispatchConfig, DispatchService, LifecycleService, MemoryStore,
};

fn fast_config() -> DispatchConfig {
    DispatchConfig {
        offer_timeout_secs: 1,
        ..DispatchConfig::default()
    }
}

fn setup(candidates: Vec<&str>) -> (BookingStore, LifecycleService, DispatchService) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = BookingStore::new(Arc::new(MemoryStore::new()));
    let config = fast_config();
    let lifecycle = LifecycleService::new(store.clone(), config.clone());
    let selection = Arc::new(FixedCandidates(
        candidates.into_iter().map(|s| s.to_string()).collect(),
    ));
    let dispatch = DispatchService::new(store.clone(), selection, config);
    (store, lifecycle, dispatch)
}

async fn create(lifecycle: &LifecycleService, rider: &str) -> ride_dispatch::BookingRecord {
    lifecycle
        .create_booking(
            rider,
            GeoPoint::new(40.4168, -3.7038),
            GeoPoint::new(40.4530, -3.6883),
            "Gran Vía 1",
            "Calle Alcalá 200",
            None,
        )
        .await
        .unwrap()
}

async fn wait_for_status(store: &BookingStore, booking_id: &str, status: BookingStatus) {
    timeout(Duration::from_secs(5), async {
        loop {
            let record = store.read_booking(booking_id).await.unwrap().unwrap();
            if record.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("booking never reached {:?}", status));
}

#[tokio::test]
async fn test_offers_fan_out_to_candidates() {
    let (store, lifecycle, dispatch) = setup(vec!["d1", "d2"]);
    let record = create(&lifecycle, "rider-1").await;
    let booking_id = record.booking_id.clone();

    let window = tokio::spawn(async move { dispatch.process_booking(&booking_id).await });

    timeout(Duration::from_secs(2), async {
        loop {
            let d1 = store.read_offer("d1", &record.booking_id).await.unwrap();
            let d2 = store.read_offer("d2", &record.booking_id).await.unwrap();
            if d1.is_some() && d2.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("offers were never written");

    let offer = store.read_offer("d1", &record.booking_id).await.unwrap().unwrap();
    assert_eq!(offer.rider_id, "rider-1");
    assert_eq!(offer.pickup_address, "Gran Vía 1");

    window.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_zero_candidates_becomes_no_drivers_exactly_once() {
    let (store, lifecycle, dispatch) = setup(vec![]);
    let record = create(&lifecycle, "rider-1").await;

    dispatch.process_booking(&record.booking_id).await.unwrap();
    let stored = store.read_booking(&record.booking_id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::NoDrivers);

    // Evento duplicado tardío para el mismo booking: no-op
    dispatch.process_booking(&record.booking_id).await.unwrap();
    let still = store.read_booking(&record.booking_id).await.unwrap().unwrap();
    assert_eq!(still.status, BookingStatus::NoDrivers);

    // Terminal: archivado y rider libre para otro booking
    let archived = store.read_history(&record.booking_id).await.unwrap().unwrap();
    assert_eq!(archived.status, BookingStatus::NoDrivers);
    create(&lifecycle, "rider-1").await;
}

#[tokio::test]
async fn test_window_expiry_transitions_to_no_drivers_and_cleans_offers() {
    let (store, lifecycle, dispatch) = setup(vec!["d1", "d2"]);
    let record = create(&lifecycle, "rider-1").await;

    dispatch.process_booking(&record.booking_id).await.unwrap();

    let stored = store.read_booking(&record.booking_id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::NoDrivers);
    assert!(store.read_offer("d1", &record.booking_id).await.unwrap().is_none());
    assert!(store.read_offer("d2", &record.booking_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_accept_during_window_wins_over_timeout() {
    let (store, lifecycle, dispatch) = setup(vec!["d1", "d2"]);
    let record = create(&lifecycle, "rider-1").await;
    let booking_id = record.booking_id.clone();

    let window = {
        let booking_id = booking_id.clone();
        tokio::spawn(async move { dispatch.process_booking(&booking_id).await })
    };

    // Esperar a que exista la oferta y aceptarla
    timeout(Duration::from_secs(2), async {
        while store.read_offer("d1", &booking_id).await.unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .unwrap();
    lifecycle.accept_booking(&booking_id, "d1", "Dana").await.unwrap();

    window.await.unwrap().unwrap();

    // El vencimiento de la ventana no pisa el claim
    let stored = store.read_booking(&booking_id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Accepted);
    assert_eq!(stored.driver_id.as_deref(), Some("d1"));

    // Las ofertas restantes se limpiaron
    assert!(store.read_offer("d2", &booking_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_all_declines_ends_search_before_timeout() {
    // Ventana larga: el final de la búsqueda debe venir de los rechazos,
    // no del timeout
    let store = BookingStore::new(Arc::new(MemoryStore::new()));
    let config = DispatchConfig {
        offer_timeout_secs: 30,
        ..DispatchConfig::default()
    };
    let lifecycle = LifecycleService::new(store.clone(), config.clone());
    let selection = Arc::new(FixedCandidates(vec!["d1".to_string(), "d2".to_string()]));
    let dispatch = DispatchService::new(store.clone(), selection, config);

    let record = create(&lifecycle, "rider-1").await;
    let booking_id = record.booking_id.clone();

    let window = {
        let booking_id = booking_id.clone();
        tokio::spawn(async move { dispatch.process_booking(&booking_id).await })
    };

    timeout(Duration::from_secs(2), async {
        loop {
            let d1 = store.read_offer("d1", &booking_id).await.unwrap();
            let d2 = store.read_offer("d2", &booking_id).await.unwrap();
            if d1.is_some() && d2.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .unwrap();

    lifecycle.decline_offer(&booking_id, "d1").await.unwrap();
    lifecycle.decline_offer(&booking_id, "d2").await.unwrap();

    // Mucho antes de los 30s de ventana
    wait_for_status(&store, &booking_id, BookingStatus::NoDrivers).await;
    window.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_loop_dispatches_new_bookings() {
    let (store, lifecycle, dispatch) = setup(vec!["d1"]);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let runner = {
        let dispatch = dispatch.clone();
        tokio::spawn(async move { dispatch.run(shutdown_rx).await })
    };
    // Dar tiempo a que el listener se enganche
    tokio::time::sleep(Duration::from_millis(50)).await;

    let record = create(&lifecycle, "rider-1").await;
    timeout(Duration::from_secs(2), async {
        while store.read_offer("d1", &record.booking_id).await.unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("run loop never produced an offer");

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reprocessing_does_not_duplicate_offers() {
    let (store, lifecycle, dispatch) = setup(vec!["d1"]);
    let record = create(&lifecycle, "rider-1").await;
    let booking_id = record.booking_id.clone();

    // Dos procesados concurrentes del mismo booking (reinicio simulado)
    let first = {
        let dispatch = dispatch.clone();
        let booking_id = booking_id.clone();
        tokio::spawn(async move { dispatch.process_booking(&booking_id).await })
    };
    let second = {
        let dispatch = dispatch.clone();
        let booking_id = booking_id.clone();
        tokio::spawn(async move { dispatch.process_booking(&booking_id).await })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // Una sola transición terminal, un solo archivo
    let stored = store.read_booking(&booking_id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::NoDrivers);
    assert!(store.read_history(&booking_id).await.unwrap().is_some());
}
