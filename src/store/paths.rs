//! Rutas del schema lógico del store

pub const BOOKINGS: &str = "bookings";
pub const DRIVER_OFFERS: &str = "driver_offers";
pub const LOYALTY_ACCOUNTS: &str = "loyalty_accounts";
pub const HISTORY: &str = "history";
pub const RATINGS: &str = "ratings";
pub const RIDER_ACTIVE: &str = "rider_active";
pub const DRIVER_PRESENCE: &str = "driver_presence";

pub fn booking(booking_id: &str) -> String {
    format!("{}/{}", BOOKINGS, booking_id)
}

pub fn driver_offers(driver_id: &str) -> String {
    format!("{}/{}", DRIVER_OFFERS, driver_id)
}

pub fn driver_offer(driver_id: &str, booking_id: &str) -> String {
    format!("{}/{}/{}", DRIVER_OFFERS, driver_id, booking_id)
}

pub fn loyalty_account(rider_id: &str) -> String {
    format!("{}/{}", LOYALTY_ACCOUNTS, rider_id)
}

pub fn history(booking_id: &str) -> String {
    format!("{}/{}", HISTORY, booking_id)
}

pub fn rating(rating_id: &str) -> String {
    format!("{}/{}", RATINGS, rating_id)
}

/// Índice "un viaje activo por rider": existe mientras el rider tiene un
/// booking no terminal.
pub fn rider_active(rider_id: &str) -> String {
    format!("{}/{}", RIDER_ACTIVE, rider_id)
}

pub fn driver_presence(driver_id: &str) -> String {
    format!("{}/{}", DRIVER_PRESENCE, driver_id)
}
