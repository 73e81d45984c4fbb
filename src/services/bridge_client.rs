//! # SDK Bridge Client
//!
//! Opens wallet sessions through a local bridge process that hosts the
//! wallet SDK and forwards to the Ark coordination server. The bridge speaks
//! plain JSON:
//!
//! | Method | Path | Body / Response |
//! |---|---|---|
//! | `POST` | `/v1/sessions` | `{privateKey, arkServerUrl}` → `{sessionId}` |
//! | `GET` | `/v1/sessions/{id}/address` | `{address, boardingAddress?}` |
//! | `POST` | `/v1/sessions/{id}/notify` | empty |
//! | `GET` | `/v1/sessions/{id}/balance` | balance snapshot |
//! | `POST` | `/v1/sessions/{id}/settle` | `{commitmentTxid}` |
//! | `POST` | `/v1/sessions/{id}/send` | `{address, amount}` → `{txid?}` |
//! | `DELETE` | `/v1/sessions/{id}` | empty |
//!
//! Errors come back as `{code, message}`; code `insufficient_funds` is
//! mapped to [`RemoteError::InsufficientFunds`].

use crate::config::network::REQUEST_TIMEOUT;
use crate::error::{WalletError, WalletResult};
use crate::identity::SecretKey;
use crate::record::BalanceSnapshot;
use crate::session::{CommitmentId, RemoteError, RemoteResult, Session, SessionFactory};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{net::IpAddr, sync::Arc};

/// Error code the bridge uses for a lack of funds
const INSUFFICIENT_FUNDS_CODE: &str = "insufficient_funds";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionRequest<'a> {
    private_key: &'a str,
    ark_server_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressResponse {
    address: String,
    #[serde(default)]
    boarding_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponse {
    commitment_txid: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    address: &'a str,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    txid: Option<String>,
}

/// Error body returned by the bridge
#[derive(Debug, Deserialize)]
struct BridgeErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// Session factory backed by the SDK bridge
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    client: Client,
    base_url: String,
}

impl HttpSessionFactory {
    /// Create a factory for the bridge at `base_url`
    pub fn new(base_url: &str) -> WalletResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WalletError::config(format!("HTTP client creation failed: {}", e)))?;

        if !is_loopback(base_url) {
            log::warn!(
                "SDK bridge {} is not on this machine; wallet secrets will cross the network",
                base_url
            );
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn is_loopback(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    match parsed.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError::unreachable(err.to_string())
}

/// Turn a bridge response into a typed value or a classified error
async fn decode<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| {
            RemoteError::rejected(format!("invalid bridge response: {}", e))
        });
    }
    Err(classify_failure(status, response).await)
}

async fn expect_empty(response: Response) -> RemoteResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(classify_failure(status, response).await)
}

async fn classify_failure(status: StatusCode, response: Response) -> RemoteError {
    let body = response.text().await.unwrap_or_default();
    classify(status, &body)
}

/// Map a failed bridge response to a remote error
fn classify(status: StatusCode, body: &str) -> RemoteError {
    let parsed = serde_json::from_str::<BridgeErrorBody>(body).ok();
    let message = match &parsed {
        Some(err) => err.message.clone(),
        None if body.is_empty() => format!("HTTP {}", status),
        None => format!("HTTP {}: {}", status, body),
    };

    if parsed.and_then(|err| err.code).as_deref() == Some(INSUFFICIENT_FUNDS_CODE) {
        return RemoteError::InsufficientFunds { message };
    }
    if status.is_server_error() {
        RemoteError::unreachable(message)
    } else {
        RemoteError::rejected(message)
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open_session(
        &self,
        secret_key: &SecretKey,
        server_url: &str,
    ) -> RemoteResult<Arc<dyn Session>> {
        let url = format!("{}/v1/sessions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&OpenSessionRequest {
                private_key: secret_key.expose_hex(),
                ark_server_url: server_url,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let opened: OpenSessionResponse = decode(response).await?;
        log::debug!("Bridge session {} opened", opened.session_id);

        Ok(Arc::new(HttpSession {
            client: self.client.clone(),
            session_url: format!("{}/v1/sessions/{}", self.base_url, opened.session_id),
        }))
    }
}

/// A session held open on the SDK bridge
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    session_url: String,
}

impl HttpSession {
    async fn addresses(&self) -> RemoteResult<AddressResponse> {
        let response = self
            .client
            .get(format!("{}/address", self.session_url))
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn address(&self) -> RemoteResult<String> {
        Ok(self.addresses().await?.address)
    }

    async fn boarding_address(&self) -> RemoteResult<Option<String>> {
        Ok(self.addresses().await?.boarding_address)
    }

    async fn notify_incoming_funds(&self) -> RemoteResult<()> {
        let response = self
            .client
            .post(format!("{}/notify", self.session_url))
            .send()
            .await
            .map_err(transport_error)?;
        expect_empty(response).await
    }

    async fn get_balance(&self) -> RemoteResult<BalanceSnapshot> {
        let response = self
            .client
            .get(format!("{}/balance", self.session_url))
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn settle(&self) -> RemoteResult<CommitmentId> {
        let response = self
            .client
            .post(format!("{}/settle", self.session_url))
            .send()
            .await
            .map_err(transport_error)?;
        let settled: SettleResponse = decode(response).await?;
        Ok(CommitmentId(settled.commitment_txid))
    }

    async fn send_bitcoin(&self, destination: &str, amount: u64) -> RemoteResult<Option<String>> {
        let response = self
            .client
            .post(format!("{}/send", self.session_url))
            .json(&SendRequest {
                address: destination,
                amount,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let sent: SendResponse = decode(response).await?;
        Ok(sent.txid.filter(|txid| !txid.is_empty()))
    }

    async fn close(&self) {
        match self.client.delete(&self.session_url).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => log::warn!("Bridge refused to close session: HTTP {}", response.status()),
            Err(e) => log::warn!("Could not close bridge session: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback("http://127.0.0.1:7070"));
        assert!(is_loopback("http://localhost:7070/"));
        assert!(is_loopback("http://[::1]:7070"));
        assert!(is_loopback("http://127.0.0.2:7070"));
        assert!(!is_loopback("https://bridge.example.com"));
        assert!(!is_loopback("http://localhost.evil.com:7070"));
        assert!(!is_loopback("http://127.0.0.1.attacker.net"));
        assert!(!is_loopback("not a url"));
    }

    #[test]
    fn test_insufficient_funds_code_is_classified() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            r#"{"code":"insufficient_funds","message":"not enough vtxos"}"#,
        );
        assert_eq!(
            err,
            RemoteError::InsufficientFunds {
                message: "not enough vtxos".to_string()
            }
        );
    }

    #[test]
    fn test_server_errors_are_unreachable() {
        let err = classify(
            StatusCode::BAD_GATEWAY,
            r#"{"code":"upstream","message":"ark server down"}"#,
        );
        assert_eq!(err, RemoteError::unreachable("ark server down"));

        // The code wins over the status
        let err = classify(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"code":"insufficient_funds","message":"short"}"#,
        );
        assert!(matches!(err, RemoteError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_other_failures_are_rejected() {
        let err = classify(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"invalid ark address"}"#,
        );
        assert_eq!(err, RemoteError::rejected("invalid ark address"));
    }

    #[test]
    fn test_unstructured_error_bodies() {
        assert_eq!(
            classify(StatusCode::NOT_FOUND, ""),
            RemoteError::rejected("HTTP 404 Not Found")
        );
        assert_eq!(
            classify(StatusCode::SERVICE_UNAVAILABLE, "upstream timeout"),
            RemoteError::unreachable("HTTP 503 Service Unavailable: upstream timeout")
        );
    }

    #[test]
    fn test_factory_trims_trailing_slash() {
        let factory = HttpSessionFactory::new("http://127.0.0.1:7070/").unwrap();
        assert_eq!(factory.base_url, "http://127.0.0.1:7070");
    }

    #[test]
    fn test_wire_types() {
        let open = serde_json::to_value(OpenSessionRequest {
            private_key: "ab",
            ark_server_url: "https://mutinynet.arkade.sh",
        })
        .unwrap();
        assert_eq!(open["privateKey"], "ab");
        assert_eq!(open["arkServerUrl"], "https://mutinynet.arkade.sh");

        let balance: BalanceSnapshot = serde_json::from_str(
            r#"{"boarding":{"confirmed":5,"unconfirmed":1,"total":6},"settled":10,"preconfirmed":2,"available":12,"recoverable":0,"total":18}"#,
        )
        .unwrap();
        assert_eq!(balance.total, 18);
        assert!(balance.validate().is_ok());

        let sent: SendResponse = serde_json::from_str("{}").unwrap();
        assert!(sent.txid.is_none());

        let err: BridgeErrorBody =
            serde_json::from_str(r#"{"code":"insufficient_funds","message":"not enough"}"#).unwrap();
        assert_eq!(err.code.as_deref(), Some(INSUFFICIENT_FUNDS_CODE));
    }

    #[tokio::test]
    #[ignore] // Only run with a bridge listening on 127.0.0.1:7070
    async fn test_open_session_against_local_bridge() {
        let factory = HttpSessionFactory::new("http://127.0.0.1:7070").unwrap();
        let key = SecretKey::generate().unwrap();
        let session = factory
            .open_session(&key, "https://mutinynet.arkade.sh")
            .await
            .unwrap();

        let address = session.address().await.unwrap();
        println!("Address: {}", address);
        let balance = session.get_balance().await.unwrap();
        assert_eq!(balance.total, 0);
        session.close().await;
    }
}
