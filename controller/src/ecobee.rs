use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use ecobee_remote_common::{HvacMode, ThermostatSnapshot};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

pub const DEFAULT_TOKEN_FILE: &str = "ecobee_config.json";

const API_BASE: &str = "https://api.ecobee.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const STATUS_TOKEN_EXPIRED: i64 = 14;

/// The thermostat operations a control pass needs.
pub trait ThermostatClient {
    /// State of the first thermostat on the account.
    async fn fetch_snapshot(&mut self) -> Result<ThermostatSnapshot, ThermostatError>;

    /// Requests an indefinite hold. Success means the request was accepted,
    /// not that the thermostat has applied it yet.
    async fn set_hold(&mut self, heat_f: f64, cool_f: f64) -> Result<(), ThermostatError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ThermostatError {
    #[error("ecobee request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ecobee returned HTTP {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("ecobee API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("unexpected ecobee response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token file {path} is not valid: {source}")]
    TokenFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("token file has no {0}; authorize the application with ecobee first")]
    MissingToken(&'static str),
    #[error("token refresh rejected with HTTP {status}: {body}")]
    Refresh { status: StatusCode, body: String },
    #[error("no thermostats are registered to this account")]
    NoThermostats,
}

/// Contents of the token file. Keys this program does not use are kept so
/// rewriting the file never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tokens {
    #[serde(rename = "API_KEY")]
    pub api_key: String,
    #[serde(rename = "ACCESS_TOKEN", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(rename = "REFRESH_TOKEN", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    async fn load(&self) -> Result<Tokens, ThermostatError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| ThermostatError::TokenFile {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_slice(&raw).map_err(|source| ThermostatError::TokenFormat {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, tokens: &Tokens) -> Result<(), ThermostatError> {
        let payload =
            serde_json::to_vec_pretty(tokens).map_err(|source| ThermostatError::TokenFormat {
                path: self.path.clone(),
                source,
            })?;
        tokio::fs::write(&self.path, payload)
            .await
            .map_err(|source| ThermostatError::TokenFile {
                path: self.path.clone(),
                source,
            })
    }
}

enum ApiRequest {
    Fetch { selection: String },
    Update { body: Value },
}

pub struct EcobeeClient {
    http: reqwest::Client,
    base_url: String,
    token_file: TokenFile,
    tokens: Tokens,
    identifier: Option<String>,
}

impl EcobeeClient {
    pub async fn from_token_file(path: &Path) -> Result<Self, ThermostatError> {
        Self::with_base_url(path, API_BASE).await
    }

    pub async fn with_base_url(
        path: &Path,
        base_url: impl Into<String>,
    ) -> Result<Self, ThermostatError> {
        let token_file = TokenFile {
            path: path.to_path_buf(),
        };
        let tokens = token_file.load().await?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_file,
            tokens,
            identifier: None,
        })
    }

    async fn refresh_tokens(&mut self) -> Result<(), ThermostatError> {
        let refresh_token = self
            .tokens
            .refresh_token
            .clone()
            .ok_or(ThermostatError::MissingToken("REFRESH_TOKEN"))?;

        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .query(&[
                ("grant_type", "refresh_token"),
                ("code", refresh_token.as_str()),
                ("client_id", self.tokens.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ThermostatError::Refresh { status, body });
        }

        let grant: TokenGrant = response.json().await?;
        self.tokens.access_token = Some(grant.access_token);
        self.tokens.refresh_token = Some(grant.refresh_token);
        self.token_file.save(&self.tokens).await?;
        info!("refreshed ecobee tokens");
        Ok(())
    }

    async fn send(&self, request: &ApiRequest) -> Result<(StatusCode, String), ThermostatError> {
        let access_token = self
            .tokens
            .access_token
            .as_deref()
            .ok_or(ThermostatError::MissingToken("ACCESS_TOKEN"))?;
        let url = format!("{}/1/thermostat", self.base_url);

        let builder = match request {
            ApiRequest::Fetch { selection } => {
                self.http.get(&url).query(&[("json", selection.as_str())])
            }
            ApiRequest::Update { body } => self
                .http
                .post(&url)
                .query(&[("format", "json")])
                .json(body),
        };

        let response = builder.bearer_auth(access_token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn call<T: DeserializeOwned>(
        &mut self,
        request: &ApiRequest,
    ) -> Result<T, ThermostatError> {
        if self.tokens.access_token.is_none() {
            self.refresh_tokens().await?;
        }

        let (mut status, mut body) = self.send(request).await?;
        if token_expired(status, &body) {
            info!("ecobee access token expired, refreshing");
            self.refresh_tokens().await?;
            (status, body) = self.send(request).await?;
        }

        parse_response(status, &body)
    }
}

impl ThermostatClient for EcobeeClient {
    async fn fetch_snapshot(&mut self) -> Result<ThermostatSnapshot, ThermostatError> {
        let selection = json!({
            "selection": {
                "selectionType": "registered",
                "selectionMatch": "",
                "includeRuntime": true,
                "includeSettings": true,
                "includeEquipmentStatus": true,
            }
        })
        .to_string();

        let response: ThermostatListResponse =
            self.call(&ApiRequest::Fetch { selection }).await?;
        let snapshot = response
            .thermostat_list
            .into_iter()
            .next()
            .ok_or(ThermostatError::NoThermostats)?
            .into_snapshot();

        self.identifier = Some(snapshot.identifier.clone());
        Ok(snapshot)
    }

    async fn set_hold(&mut self, heat_f: f64, cool_f: f64) -> Result<(), ThermostatError> {
        let identifier = match &self.identifier {
            Some(identifier) => identifier.clone(),
            None => self.fetch_snapshot().await?.identifier,
        };

        let body = json!({
            "selection": {
                "selectionType": "thermostats",
                "selectionMatch": identifier,
            },
            "functions": [{
                "type": "setHold",
                "params": {
                    "holdType": "indefinite",
                    "heatHoldTemp": to_tenths(heat_f),
                    "coolHoldTemp": to_tenths(cool_f),
                }
            }]
        });

        let _: StatusEnvelope = self.call(&ApiRequest::Update { body }).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: ApiStatus,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThermostatListResponse {
    #[serde(default)]
    thermostat_list: Vec<ApiThermostat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiThermostat {
    identifier: String,
    #[serde(default)]
    name: String,
    settings: ApiSettings,
    runtime: ApiRuntime,
    #[serde(default)]
    equipment_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSettings {
    hvac_mode: HvacMode,
}

/// Temperatures are integers in tenths of a degree Fahrenheit.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRuntime {
    actual_temperature: i32,
    desired_heat: i32,
    desired_cool: i32,
}

impl ApiThermostat {
    fn into_snapshot(self) -> ThermostatSnapshot {
        ThermostatSnapshot {
            identifier: self.identifier,
            name: self.name,
            mode: self.settings.hvac_mode,
            current_temp_f: from_tenths(self.runtime.actual_temperature),
            heat_setpoint_f: from_tenths(self.runtime.desired_heat),
            cool_setpoint_f: from_tenths(self.runtime.desired_cool),
            equipment_status: self
                .equipment_status
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

fn from_tenths(raw: i32) -> f64 {
    f64::from(raw) / 10.0
}

fn to_tenths(degrees: f64) -> i64 {
    (degrees * 10.0).round() as i64
}

fn token_expired(status: StatusCode, body: &str) -> bool {
    status == StatusCode::UNAUTHORIZED
        || serde_json::from_str::<StatusEnvelope>(body)
            .is_ok_and(|envelope| envelope.status.code == STATUS_TOKEN_EXPIRED)
}

fn parse_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<T, ThermostatError> {
    if let Ok(StatusEnvelope { status: api }) = serde_json::from_str::<StatusEnvelope>(body) {
        if api.code != 0 {
            return Err(ThermostatError::Api {
                code: api.code,
                message: api.message,
            });
        }
    }

    if !status.is_success() {
        return Err(ThermostatError::HttpStatus {
            status,
            body: body.to_string(),
        });
    }

    serde_json::from_str(body).map_err(ThermostatError::Decode)
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use pretty_assertions::assert_eq;

    use super::*;

    const THERMOSTAT_LIST: &str = r#"{
        "page": {"page": 1, "totalPages": 1, "pageSize": 1, "total": 1},
        "thermostatList": [{
            "identifier": "311019999999",
            "name": "Hallway",
            "settings": {"hvacMode": "heat"},
            "runtime": {"actualTemperature": 684, "desiredHeat": 680, "desiredCool": 780},
            "equipmentStatus": "auxHeat1,fan"
        }],
        "status": {"code": 0, "message": ""}
    }"#;

    const OK_STATUS: &str = r#"{"status": {"code": 0, "message": ""}}"#;

    fn write_tokens(dir: &tempfile::TempDir, access: &str) -> PathBuf {
        let path = dir.path().join("ecobee_config.json");
        let contents = json!({
            "API_KEY": "app-key",
            "ACCESS_TOKEN": access,
            "REFRESH_TOKEN": "old-refresh",
            "AUTHORIZATION_CODE": "code-1",
            "THERMOSTAT_NAME": "Hallway",
        });
        std::fs::write(&path, contents.to_string()).unwrap();
        path
    }

    #[tokio::test]
    async fn fetch_projects_first_thermostat() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/1/thermostat")
            .match_query(Matcher::Regex("json=".to_string()))
            .match_header("authorization", "Bearer access-1")
            .with_status(200)
            .with_body(THERMOSTAT_LIST)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_tokens(&dir, "access-1");

        let mut client = EcobeeClient::with_base_url(&path, server.url()).await.unwrap();
        let snapshot = client.fetch_snapshot().await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            snapshot,
            ThermostatSnapshot {
                identifier: "311019999999".to_string(),
                name: "Hallway".to_string(),
                mode: HvacMode::Heat,
                current_temp_f: 68.4,
                heat_setpoint_f: 68.0,
                cool_setpoint_f: 78.0,
                equipment_status: vec!["auxHeat1".to_string(), "fan".to_string()],
            }
        );
        assert!(snapshot.is_equipment_running());
    }

    #[test]
    fn idle_equipment_and_unknown_mode_project_cleanly() {
        let raw: ApiThermostat = serde_json::from_str(
            r#"{
                "identifier": "1",
                "settings": {"hvacMode": "emergencyHeat"},
                "runtime": {"actualTemperature": 701, "desiredHeat": 700, "desiredCool": 750},
                "equipmentStatus": ""
            }"#,
        )
        .unwrap();

        let snapshot = raw.into_snapshot();

        assert_eq!(snapshot.mode, HvacMode::Unknown);
        assert!(snapshot.equipment_status.is_empty());
        assert!(!snapshot.is_equipment_running());
        assert_eq!(snapshot.current_temp_f, 70.1);
        assert_eq!(snapshot.heat_setpoint_f, 70.0);
    }

    #[tokio::test]
    async fn empty_thermostat_list_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/1/thermostat")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"thermostatList": [], "status": {"code": 0, "message": ""}}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_tokens(&dir, "access-1");

        let mut client = EcobeeClient::with_base_url(&path, server.url()).await.unwrap();

        assert!(matches!(
            client.fetch_snapshot().await,
            Err(ThermostatError::NoThermostats)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_persisted_and_retried() {
        let mut server = mockito::Server::new_async().await;
        let expired = server
            .mock("GET", "/1/thermostat")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer stale")
            .with_status(500)
            .with_body(r#"{"status": {"code": 14, "message": "Token has expired."}}"#)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".to_string(), "refresh_token".to_string()),
                Matcher::UrlEncoded("code".to_string(), "old-refresh".to_string()),
                Matcher::UrlEncoded("client_id".to_string(), "app-key".to_string()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"access_token": "fresh", "token_type": "Bearer", "expires_in": 3599,
                    "refresh_token": "new-refresh", "scope": "smartWrite"}"#,
            )
            .create_async()
            .await;
        let retried = server
            .mock("GET", "/1/thermostat")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .with_body(THERMOSTAT_LIST)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_tokens(&dir, "stale");

        let mut client = EcobeeClient::with_base_url(&path, server.url()).await.unwrap();
        let snapshot = client.fetch_snapshot().await.unwrap();

        expired.assert_async().await;
        refresh.assert_async().await;
        retried.assert_async().await;
        assert_eq!(snapshot.heat_setpoint_f, 68.0);

        let saved: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["ACCESS_TOKEN"], "fresh");
        assert_eq!(saved["REFRESH_TOKEN"], "new-refresh");
        assert_eq!(saved["API_KEY"], "app-key");
        assert_eq!(saved["THERMOSTAT_NAME"], "Hallway");
    }

    #[tokio::test]
    async fn rejected_refresh_surfaces_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/1/thermostat")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("")
            .create_async()
            .await;
        server
            .mock("POST", "/token")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_tokens(&dir, "stale");

        let mut client = EcobeeClient::with_base_url(&path, server.url()).await.unwrap();

        assert!(matches!(
            client.fetch_snapshot().await,
            Err(ThermostatError::Refresh { .. })
        ));
    }

    #[tokio::test]
    async fn set_hold_posts_indefinite_hold_in_tenths() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/1/thermostat")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(THERMOSTAT_LIST)
            .create_async()
            .await;
        let hold = server
            .mock("POST", "/1/thermostat")
            .match_query(Matcher::UrlEncoded("format".to_string(), "json".to_string()))
            .match_header("authorization", "Bearer access-1")
            .match_body(Matcher::Json(json!({
                "selection": {
                    "selectionType": "thermostats",
                    "selectionMatch": "311019999999",
                },
                "functions": [{
                    "type": "setHold",
                    "params": {
                        "holdType": "indefinite",
                        "heatHoldTemp": 700,
                        "coolHoldTemp": 700,
                    }
                }]
            })))
            .with_status(200)
            .with_body(OK_STATUS)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_tokens(&dir, "access-1");

        let mut client = EcobeeClient::with_base_url(&path, server.url()).await.unwrap();
        client.set_hold(70.0, 70.0).await.unwrap();

        hold.assert_async().await;
    }

    #[tokio::test]
    async fn set_hold_api_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/1/thermostat")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(THERMOSTAT_LIST)
            .create_async()
            .await;
        server
            .mock("POST", "/1/thermostat")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"status": {"code": 3, "message": "Processing error."}}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_tokens(&dir, "access-1");

        let mut client = EcobeeClient::with_base_url(&path, server.url()).await.unwrap();
        let err = client.set_hold(70.0, 70.0).await.unwrap_err();

        assert!(
            matches!(err, ThermostatError::Api { code: 3, .. }),
            "{err}"
        );
    }

    #[tokio::test]
    async fn missing_token_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();

        let result =
            EcobeeClient::with_base_url(&dir.path().join("absent.json"), "http://localhost").await;

        assert!(matches!(result, Err(ThermostatError::TokenFile { .. })));
    }

    #[test]
    fn tokens_round_trip_keeps_unknown_keys() {
        let raw = r#"{"API_KEY": "k", "REFRESH_TOKEN": "r", "EXTRA": 5}"#;

        let tokens: Tokens = serde_json::from_str(raw).unwrap();
        let rewritten: Value = serde_json::to_value(&tokens).unwrap();

        assert_eq!(tokens.access_token, None);
        assert_eq!(
            rewritten,
            json!({"API_KEY": "k", "REFRESH_TOKEN": "r", "EXTRA": 5})
        );
    }

    #[test]
    fn tenths_conversion_rounds() {
        assert_eq!(to_tenths(70.0), 700);
        assert_eq!(to_tenths(68.56), 686);
        assert_eq!(from_tenths(-15), -1.5);
    }
}
