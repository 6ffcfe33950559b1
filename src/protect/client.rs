//! Protect HTTP client

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{CameraRecord, Credentials, MotionEventRecord, Session};
use crate::{Error, Result};

/// Motion query window: one day back, slight lookahead for clock skew
pub const MOTION_LOOKBACK_SECS: i64 = 86_400;
pub const MOTION_LOOKAHEAD_SECS: i64 = 10;

/// HTTP client for the local NVR API
pub struct ProtectClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
    session: Session,
}

impl ProtectClient {
    /// Create a client for the NVR at `base_url` (e.g. `https://nvr:7443`)
    ///
    /// Local NVRs ship self-signed certificates, hence the relaxed TLS
    /// verification.
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
            session: Session::new(),
        })
    }

    /// Exchange credentials for a bearer token
    ///
    /// The NVR returns the token in the `Authorization` response header
    /// rather than the body.
    pub async fn login(&self) -> Result<()> {
        let url = format!("{}/api/auth", self.base_url);
        let body = serde_json::json!({
            "username": self.credentials.username,
            "password": self.credentials.password,
        });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth("NVR reported authorization failure".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Api(format!("Login returned status {}", status.as_u16())));
        }

        let token = response
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Auth("Login response carried no authorization header".to_string()))?
            .to_string();

        self.session.set(token).await;
        info!(url = %url, "Authenticated against NVR");
        Ok(())
    }

    /// Drop the current token and log in again
    pub async fn renew(&self) -> Result<()> {
        self.session.clear().await;
        self.login().await
    }

    pub async fn authenticated(&self) -> bool {
        self.session.authenticated().await
    }

    async fn bearer(&self) -> Result<String> {
        if !self.session.authenticated().await {
            self.login().await?;
        }
        self.session
            .bearer()
            .await
            .ok_or_else(|| Error::Auth("No bearer token".to_string()))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.session.clear().await;
            return Err(Error::Auth("NVR reported authorization failure".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Api(format!("Status {} from {}", status.as_u16(), url)));
        }

        Ok(response.json().await?)
    }

    /// Fetch the camera inventory from the bootstrap endpoint
    pub async fn bootstrap(&self) -> Result<Vec<CameraRecord>> {
        let url = format!("{}/api/bootstrap", self.base_url);
        let body = self.get_json(&url).await?;

        let cameras = body
            .get("cameras")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Malformed("Bootstrap response without cameras array".to_string()))?;

        let mut records = Vec::with_capacity(cameras.len());
        for entry in cameras {
            match serde_json::from_value::<CameraRecord>(entry.clone()) {
                Ok(record) if record.fields.contains_key("id") => records.push(record),
                _ => {
                    // One bad record must not block its siblings
                    warn!("Skipping malformed camera record");
                }
            }
        }

        debug!(count = records.len(), "Fetched camera list");
        Ok(records)
    }

    /// Fetch motion events inside the `[start, end]` epoch-millis window
    pub async fn motion_events(&self, start_ms: i64, end_ms: i64) -> Result<Vec<MotionEventRecord>> {
        let url = format!(
            "{}/api/events?end={}&start={}&type=motion",
            self.base_url, end_ms, start_ms
        );
        let body = self.get_json(&url).await?;

        let events = body
            .as_array()
            .ok_or_else(|| Error::Malformed("Events response is not an array".to_string()))?;

        let mut records = Vec::with_capacity(events.len());
        for entry in events {
            match serde_json::from_value::<MotionEventRecord>(entry.clone()) {
                Ok(record) if record.fields.contains_key("id") => records.push(record),
                _ => warn!("Skipping malformed motion event"),
            }
        }

        debug!(count = records.len(), "Fetched motion events");
        Ok(records)
    }

    /// Push a writable setting to a camera
    pub async fn patch_camera(&self, camera_id: &str, body: Value) -> Result<()> {
        let token = self.bearer().await?;
        let url = format!("{}/api/cameras/{}", self.base_url, camera_id);

        let response = self
            .http
            .patch(&url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.session.clear().await;
            return Err(Error::Auth("NVR reported authorization failure".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Api(format!(
                "Camera patch returned status {}",
                status.as_u16()
            )));
        }

        debug!(camera_id = %camera_id, "Camera setting patched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> Credentials {
        Credentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn login_takes_token_from_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .and(body_json(json!({"username": "admin", "password": "secret"})))
            .respond_with(ResponseTemplate::new(200).insert_header("authorization", "tok-123"))
            .mount(&server)
            .await;

        let client = ProtectClient::new(server.uri(), credentials()).unwrap();
        client.login().await.unwrap();
        assert!(client.authenticated().await);
    }

    #[tokio::test]
    async fn login_rejection_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = ProtectClient::new(server.uri(), credentials()).unwrap();
        assert!(matches!(client.login().await, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn bootstrap_parses_cameras_and_skips_bad_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200).insert_header("authorization", "tok"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cameras": [
                    {"id": "c1", "name": "Front"},
                    {"name": "no id here"},
                    {"id": "c2", "name": "Back"}
                ]
            })))
            .mount(&server)
            .await;

        let client = ProtectClient::new(server.uri(), credentials()).unwrap();
        let cameras = client.bootstrap().await.unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].id().unwrap(), "c1");
    }

    #[tokio::test]
    async fn expired_token_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200).insert_header("authorization", "tok"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = ProtectClient::new(server.uri(), credentials()).unwrap();
        let err = client.bootstrap().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        // Token was dropped so the next call re-authenticates
        assert!(!client.authenticated().await);
    }

    #[tokio::test]
    async fn motion_query_sends_window_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200).insert_header("authorization", "tok"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/events"))
            .and(query_param("start", "1000"))
            .and(query_param("end", "2000"))
            .and(query_param("type", "motion"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "m1", "camera": "c1", "score": 42}
            ])))
            .mount(&server)
            .await;

        let client = ProtectClient::new(server.uri(), credentials()).unwrap();
        let events = client.motion_events(1000, 2000).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].camera().unwrap(), "c1");
    }
}
