// src/storage/http.rs
//
// JSON-over-HTTP storage backend.
//
//   POST  /trajectories                       → {"id": n}
//   POST  /trajectories/{id}/points
//   POST  /trajectories/{id}/observations
//   PATCH /trajectories/{id}/geometry
//   PATCH /trajectories/{id}/end
//   GET   /users/{user}/trajectories
//   GET   /trajectories/{id}
//   POST  /trajectories/{id}/danger-index
//   GET   /trajectories/{id}/danger-index      → {"value": f | null}
//   GET   /danger-index/average               → {"count": n, "average": f | null}
//   GET   /heatmap                            → [{"lat", "lon", "weight"}]
//
// Request timeouts surface as `StorageError::Timeout`, which the commit
// coordinator treats like any other step failure.

use super::TrajectoryStore;
use crate::error::StorageError;
use crate::types::{
    HazardObservation, HeatPoint, LatLng, PopulationAverage, Trajectory, TrajectoryHeader,
    TrajectoryId, TrajectoryPoint,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: i64,
}

#[derive(Debug, Serialize)]
struct GeometryUpdate {
    ended_at: DateTime<Utc>,
    /// [lon, lat] pairs in capture order
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
struct EndUpdate {
    ended_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DangerIndexResponse {
    value: Option<f64>,
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct HttpStore {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, StorageError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        error!("Storage returned {}: {}", status, body);
        Err(StorageError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, StorageError> {
        let url = self.url(path);
        debug!("{} {}", method, url);
        let mut request = self.http_client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::check(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StorageError> {
        let response = self
            .send::<()>(reqwest::Method::GET, path, None)
            .await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))
    }
}

fn not_found_as(id: TrajectoryId, e: StorageError) -> StorageError {
    match e {
        StorageError::Status { status: 404, .. } => StorageError::NotFound(id),
        other => other,
    }
}

#[async_trait]
impl TrajectoryStore for HttpStore {
    async fn create_trajectory(
        &self,
        header: &TrajectoryHeader,
    ) -> Result<TrajectoryId, StorageError> {
        let response = self
            .send(reqwest::Method::POST, "/trajectories", Some(header))
            .await?;
        let created: CreatedResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        Ok(TrajectoryId(created.id))
    }

    async fn add_trajectory_point(
        &self,
        id: TrajectoryId,
        point: &TrajectoryPoint,
    ) -> Result<(), StorageError> {
        self.send(
            reqwest::Method::POST,
            &format!("/trajectories/{}/points", id.0),
            Some(point),
        )
        .await
        .map_err(|e| not_found_as(id, e))?;
        Ok(())
    }

    async fn add_hazard_observation(
        &self,
        id: TrajectoryId,
        observation: &HazardObservation,
    ) -> Result<(), StorageError> {
        self.send(
            reqwest::Method::POST,
            &format!("/trajectories/{}/observations", id.0),
            Some(observation),
        )
        .await
        .map_err(|e| not_found_as(id, e))?;
        Ok(())
    }

    async fn update_trajectory_geometry(
        &self,
        id: TrajectoryId,
        line: &[LatLng],
        ended_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let body = GeometryUpdate {
            ended_at,
            coordinates: line.iter().map(|c| [c.longitude, c.latitude]).collect(),
        };
        self.send(
            reqwest::Method::PATCH,
            &format!("/trajectories/{}/geometry", id.0),
            Some(&body),
        )
        .await
        .map_err(|e| not_found_as(id, e))?;
        Ok(())
    }

    async fn update_trajectory_end(
        &self,
        id: TrajectoryId,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.send(
            reqwest::Method::PATCH,
            &format!("/trajectories/{}/end", id.0),
            Some(&EndUpdate { ended_at }),
        )
        .await
        .map_err(|e| not_found_as(id, e))?;
        Ok(())
    }

    async fn list_user_trajectories(
        &self,
        user_id: &str,
    ) -> Result<Vec<Trajectory>, StorageError> {
        self.get_json(&format!("/users/{}/trajectories", user_id))
            .await
    }

    async fn get_trajectory_detail(&self, id: TrajectoryId) -> Result<Trajectory, StorageError> {
        self.get_json(&format!("/trajectories/{}", id.0))
            .await
            .map_err(|e| not_found_as(id, e))
    }

    async fn compute_and_cache_danger_index(&self, id: TrajectoryId) -> Result<(), StorageError> {
        self.send::<()>(
            reqwest::Method::POST,
            &format!("/trajectories/{}/danger-index", id.0),
            None,
        )
        .await
        .map_err(|e| not_found_as(id, e))?;
        Ok(())
    }

    async fn get_danger_index(&self, id: TrajectoryId) -> Result<Option<f64>, StorageError> {
        let response: DangerIndexResponse = self
            .get_json(&format!("/trajectories/{}/danger-index", id.0))
            .await
            .map_err(|e| not_found_as(id, e))?;
        Ok(response.value)
    }

    async fn get_population_average(&self) -> Result<PopulationAverage, StorageError> {
        self.get_json("/danger-index/average").await
    }

    async fn heatmap_points(&self) -> Result<Vec<HeatPoint>, StorageError> {
        self.get_json("/heatmap").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = HttpStore::new("http://localhost:8989/api/", 5).unwrap();
        assert_eq!(store.base_url(), "http://localhost:8989/api");
        assert_eq!(
            store.url("/trajectories"),
            "http://localhost:8989/api/trajectories"
        );
    }

    #[test]
    fn test_geometry_body_uses_lon_lat_order() {
        let body = GeometryUpdate {
            ended_at: Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap(),
            coordinates: [LatLng::new(47.1, 8.5)]
                .iter()
                .map(|c| [c.longitude, c.latitude])
                .collect(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["coordinates"][0][0], 8.5);
        assert_eq!(json["coordinates"][0][1], 47.1);
    }

    #[test]
    fn test_not_found_mapping() {
        let e = StorageError::Status {
            status: 404,
            body: String::new(),
        };
        assert!(matches!(
            not_found_as(TrajectoryId(3), e),
            StorageError::NotFound(TrajectoryId(3))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let store = HttpStore::new("http://127.0.0.1:9", 1).unwrap();
        let result = store.get_population_average().await;
        assert!(matches!(
            result,
            Err(StorageError::Transport(_)) | Err(StorageError::Timeout)
        ));
    }
}
