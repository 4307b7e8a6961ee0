//! Nominatim-compatible search client

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{Candidate, GeocodeError, Geocoder};
use crate::config::GeocodingConfig;

#[derive(Debug, Deserialize)]
struct Place {
    place_id: serde_json::Value,
    #[serde(default)]
    name: Option<String>,
    display_name: String,
    lat: String,
    lon: String,
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct Address {
    country_code: Option<String>,
}

#[derive(Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
    limit: usize,
    user_agent: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            limit: config.result_limit.max(1),
            user_agent: config.user_agent.clone(),
        }
    }

    async fn lookup(self, query: String) -> Result<Vec<Candidate>, GeocodeError> {
        info!("Searching for {:?}", query);
        let limit = self.limit.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("q", query.as_str()),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let candidates = parse_places(&body)?;
        debug!("{} candidates for {:?}", candidates.len(), query);
        Ok(candidates)
    }
}

impl Geocoder for NominatimGeocoder {
    fn search(&self, query: &str) -> BoxFuture<'static, Result<Vec<Candidate>, GeocodeError>> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return futures::future::ready(Err(GeocodeError::EmptyQuery)).boxed();
        }
        self.clone().lookup(query).boxed()
    }
}

/// Parse a search response, skipping entries with unusable coordinates
fn parse_places(body: &str) -> Result<Vec<Candidate>, GeocodeError> {
    let places: Vec<Place> = serde_json::from_str(body)?;
    Ok(places.into_iter().filter_map(into_candidate).collect())
}

fn into_candidate(place: Place) -> Option<Candidate> {
    let lat = place.lat.parse::<f64>().ok()?;
    let lng = place.lon.parse::<f64>().ok()?;
    let name = place
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| place.display_name.split(',').next().map(|s| s.trim().to_string()))
        .unwrap_or_default();
    let place_id = match place.place_id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    Some(Candidate {
        place_id,
        name,
        display_name: place.display_name,
        lat,
        lng,
        country_code: place
            .address
            .and_then(|a| a.country_code)
            .unwrap_or_default()
            .to_lowercase(),
    })
}
