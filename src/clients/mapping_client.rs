//! Cliente del servicio externo de mapas
//!
//! El núcleo no reimplementa routing: solo consume distancia y duración
//! como entradas de tarifa (la polilínea se pasa tal cual a la capa de
//! mapas de la UI). `RouteEstimator` es la costura; la implementación
//! real llama a la API de direcciones de Mapbox.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::models::GeoPoint;

/// Estimación de ruta entre dos coordenadas
#[derive(Debug, Clone)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub polyline: Option<String>,
}

#[async_trait]
pub trait RouteEstimator: Send + Sync {
    async fn estimate(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<RouteEstimate>;
}

#[derive(Debug, Deserialize)]
struct MapboxDirectionsResponse {
    routes: Vec<MapboxRoute>,
}

#[derive(Debug, Deserialize)]
struct MapboxRoute {
    /// Metros
    distance: f64,
    /// Segundos
    duration: f64,
    geometry: Option<String>,
}

pub struct MapboxDirectionsClient {
    mapbox_token: String,
    client: reqwest::Client,
}

impl MapboxDirectionsClient {
    pub fn new(mapbox_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            mapbox_token,
            client,
        }
    }
}

#[async_trait]
impl RouteEstimator for MapboxDirectionsClient {
    async fn estimate(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<RouteEstimate> {
        info!(
            "🗺️ Solicitando ruta {},{} -> {},{}",
            origin.lat, origin.lng, destination.lat, destination.lng
        );

        // Mapbox espera lng,lat
        let coords = format!(
            "{},{};{},{}",
            origin.lng, origin.lat, destination.lng, destination.lat
        );
        let url = format!(
            "https://api.mapbox.com/directions/v5/mapbox/driving/{}?access_token={}&overview=full&geometries=polyline",
            urlencoding::encode(&coords),
            self.mapbox_token
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Mapbox directions devolvió status {}",
                response.status()
            ));
        }

        let body: MapboxDirectionsResponse = response.json().await?;
        let route = body
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Mapbox no devolvió ninguna ruta"))?;

        Ok(RouteEstimate {
            distance_km: route.distance / 1000.0,
            duration_minutes: route.duration / 60.0,
            polyline: route.geometry,
        })
    }
}

/// Estimador sin red para tests y entornos locales: distancia haversine
/// a una velocidad urbana supuesta.
pub struct StraightLineEstimator {
    pub assumed_speed_kmh: f64,
}

impl Default for StraightLineEstimator {
    fn default() -> Self {
        Self {
            assumed_speed_kmh: 30.0,
        }
    }
}

#[async_trait]
impl RouteEstimator for StraightLineEstimator {
    async fn estimate(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<RouteEstimate> {
        let distance_km = haversine_km(origin, destination);
        let duration_minutes = distance_km / self.assumed_speed_kmh * 60.0;
        Ok(RouteEstimate {
            distance_km,
            duration_minutes,
            polyline: None,
        })
    }
}

fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}
