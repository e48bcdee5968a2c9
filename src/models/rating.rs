//! Valoraciones post-viaje
//!
//! Inmutables una vez escritas; como máximo una por `(booking_id, rater_id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_RATING_SCORE: u8 = 1;
pub const MAX_RATING_SCORE: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub rating_id: String,
    pub booking_id: String,
    pub rater_id: String,
    pub rated_id: String,
    pub score: u8,
    pub comment: Option<String>,
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
}
