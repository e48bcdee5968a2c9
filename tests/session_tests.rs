use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use ride_dispatch::controllers::OfferEvent;
use ride_dispatch::models::{BookingStatus, DriverOffer, GeoPoint};
use ride_dispatch::services::lifecycle_service::CANCEL_REASON_USER;
use ride_dispatch::store::paths;
use ride_dispatch::{
    BookingStore, DispatchConfig, DriverSessionController, LifecycleService, MemoryStore,
    RideView, RiderSessionController,
};

fn setup() -> (Arc<MemoryStore>, BookingStore, LifecycleService) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let memory = Arc::new(MemoryStore::new());
    let store = BookingStore::new(memory.clone());
    let lifecycle = LifecycleService::new(store.clone(), DispatchConfig::default());
    (memory, store, lifecycle)
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

async fn next_view(rx: &mut tokio::sync::mpsc::UnboundedReceiver<RideView>) -> RideView {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a view")
        .expect("view channel closed")
}

#[tokio::test]
async fn test_rider_session_follows_the_trip() {
    let (_memory, store, lifecycle) = setup();
    let record = create(&lifecycle, "rider-1").await;

    let (controller, mut views) = RiderSessionController::attach(store.clone(), &record.booking_id)
        .await
        .unwrap();

    assert_eq!(next_view(&mut views).await, RideView::Searching);

    lifecycle.accept_booking(&record.booking_id, "d1", "Dana").await.unwrap();
    assert_eq!(
        next_view(&mut views).await,
        RideView::DriverAssigned {
            driver_id: "d1".to_string(),
            driver_name: "Dana".to_string(),
        }
    );

    lifecycle
        .advance_trip_status(&record.booking_id, BookingStatus::EnRouteToPickup, "d1")
        .await
        .unwrap();
    assert!(matches!(next_view(&mut views).await, RideView::DriverEnRoute { .. }));

    lifecycle
        .advance_trip_status(&record.booking_id, BookingStatus::ArrivedAtPickup, "d1")
        .await
        .unwrap();
    assert_eq!(next_view(&mut views).await, RideView::DriverArrived);

    lifecycle
        .advance_trip_status(&record.booking_id, BookingStatus::EnRouteToDropoff, "d1")
        .await
        .unwrap();
    assert!(matches!(next_view(&mut views).await, RideView::TripInProgress { .. }));

    lifecycle.complete_trip(&record.booking_id, "d1", 5.0, 15.0).await.unwrap();
    assert!(matches!(next_view(&mut views).await, RideView::Completed { .. }));

    controller.close();
}

#[tokio::test]
async fn test_live_location_flows_into_trip_view() {
    let (_memory, store, lifecycle) = setup();
    let record = create(&lifecycle, "rider-1").await;
    lifecycle.accept_booking(&record.booking_id, "d1", "Dana").await.unwrap();
    lifecycle
        .advance_trip_status(&record.booking_id, BookingStatus::EnRouteToPickup, "d1")
        .await
        .unwrap();

    let (controller, mut views) = RiderSessionController::attach(store.clone(), &record.booking_id)
        .await
        .unwrap();
    assert!(matches!(
        next_view(&mut views).await,
        RideView::DriverEnRoute { driver_location: None }
    ));

    lifecycle
        .update_driver_location(&record.booking_id, "d1", GeoPoint::new(40.42, -3.70))
        .await
        .unwrap();
    match next_view(&mut views).await {
        RideView::DriverEnRoute {
            driver_location: Some(location),
        } => assert!((location.lat - 40.42).abs() < 1e-9),
        other => panic!("unexpected view: {:?}", other),
    }

    controller.close();
}

#[tokio::test]
async fn test_terminal_view_is_delivered_once_and_never_replayed() {
    let (_memory, store, lifecycle) = setup();
    let record = create(&lifecycle, "rider-1").await;

    let (controller, mut views) = RiderSessionController::attach(store.clone(), &record.booking_id)
        .await
        .unwrap();
    assert_eq!(next_view(&mut views).await, RideView::Searching);

    lifecycle
        .cancel_booking(&record.booking_id, "rider-1", CANCEL_REASON_USER)
        .await
        .unwrap();
    assert_eq!(
        next_view(&mut views).await,
        RideView::Canceled {
            reason: CANCEL_REASON_USER.to_string()
        }
    );

    // Reconexión: el snapshot inicial volvería a entregar el terminal;
    // el controlador lo suprime
    controller.resubscribe().await.unwrap();
    let replay = timeout(Duration::from_millis(300), views.recv()).await;
    assert!(replay.is_err(), "stale terminal state must not be replayed");

    controller.close();
}

#[tokio::test]
async fn test_duplicate_snapshots_are_deduplicated() {
    let (_memory, store, lifecycle) = setup();
    let record = create(&lifecycle, "rider-1").await;

    let (controller, mut views) = RiderSessionController::attach(store.clone(), &record.booking_id)
        .await
        .unwrap();
    assert_eq!(next_view(&mut views).await, RideView::Searching);

    // Resuscribir reentrega el snapshot SEARCHING; la vista no cambia
    controller.resubscribe().await.unwrap();
    let duplicate = timeout(Duration::from_millis(300), views.recv()).await;
    assert!(duplicate.is_err(), "identical consecutive views must be suppressed");

    controller.close();
}

#[tokio::test]
async fn test_removed_booking_projects_as_canceled_not_crash() {
    let (_memory, store, lifecycle) = setup();
    let record = create(&lifecycle, "rider-1").await;

    let (controller, mut views) = RiderSessionController::attach(store.clone(), &record.booking_id)
        .await
        .unwrap();
    assert_eq!(next_view(&mut views).await, RideView::Searching);

    // La otra parte hizo desaparecer el registro
    store.client().delete(&paths::booking(&record.booking_id)).await.unwrap();
    assert!(matches!(next_view(&mut views).await, RideView::Canceled { .. }));

    controller.close();
}

#[tokio::test]
async fn test_driver_session_sees_offers_and_withdrawals() {
    let (_memory, store, lifecycle) = setup();
    let record = create(&lifecycle, "rider-1").await;

    let (controller, mut offers) = DriverSessionController::attach(store.clone(), "d1")
        .await
        .unwrap();

    store
        .write_offer(&DriverOffer::for_driver(&record, "d1"))
        .await
        .unwrap();
    match timeout(Duration::from_secs(2), offers.recv()).await.unwrap().unwrap() {
        OfferEvent::Offered(offer) => {
            assert_eq!(offer.booking_id, record.booking_id);
            assert_eq!(offer.rider_id, "rider-1");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    lifecycle.decline_offer(&record.booking_id, "d1").await.unwrap();
    match timeout(Duration::from_secs(2), offers.recv()).await.unwrap().unwrap() {
        OfferEvent::Withdrawn { booking_id } => assert_eq!(booking_id, record.booking_id),
        other => panic!("unexpected event: {:?}", other),
    }

    // El rechazo no toca el registro
    let untouched = store.read_booking(&record.booking_id).await.unwrap().unwrap();
    assert_eq!(untouched.status, BookingStatus::Searching);

    controller.close();
}

#[tokio::test]
async fn test_driver_watches_claimed_booking() {
    let (_memory, store, lifecycle) = setup();
    let record = create(&lifecycle, "rider-1").await;

    let (controller, _offers) = DriverSessionController::attach(store.clone(), "d1")
        .await
        .unwrap();
    lifecycle.accept_booking(&record.booking_id, "d1", "Dana").await.unwrap();

    let mut views = controller.watch_booking(&record.booking_id).await.unwrap();
    assert!(matches!(next_view(&mut views).await, RideView::DriverAssigned { .. }));

    controller.close();
}

#[tokio::test]
async fn test_resubscribe_concurrent_with_new_watch_keeps_it_alive() {
    let (_memory, store, lifecycle) = setup();
    let first = create(&lifecycle, "rider-1").await;
    let second = create(&lifecycle, "rider-2").await;

    let (controller, _offers) = DriverSessionController::attach(store.clone(), "d1")
        .await
        .unwrap();
    let _stale_views = controller.watch_booking(&first.booking_id).await.unwrap();

    // Reconexión y cambio de booking a la vez: el watch nuevo debe
    // sobrevivir sea cual sea el entrelazado
    let (resubscribed, watched) = tokio::join!(
        controller.resubscribe(),
        controller.watch_booking(&second.booking_id)
    );
    resubscribed.unwrap();
    let mut views = watched.unwrap();

    assert_eq!(next_view(&mut views).await, RideView::Searching);
    lifecycle.accept_booking(&second.booking_id, "d1", "Dana").await.unwrap();
    assert!(matches!(next_view(&mut views).await, RideView::DriverAssigned { .. }));

    controller.close();
}

#[tokio::test]
async fn test_abrupt_disconnect_clears_driver_presence() {
    let (memory, store, _lifecycle) = setup();

    let (controller, _offers) = DriverSessionController::attach(store.clone(), "d1")
        .await
        .unwrap();
    assert!(store
        .client()
        .read(&paths::driver_presence("d1"))
        .await
        .unwrap()
        .is_some());

    memory.simulate_disconnect().await;
    assert!(store
        .client()
        .read(&paths::driver_presence("d1"))
        .await
        .unwrap()
        .is_none());

    controller.close();
}
