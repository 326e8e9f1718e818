//! Source verification against an Etherscan-compatible API

use std::fs;
use std::path::PathBuf;

use alloy_primitives::Address;
use lottery_bindings::codec::{self, AbiValue};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::VerifyConfig;

const PENDING: &str = "pending in queue";
const PASS: &str = "pass - verified";
const ALREADY_VERIFIED: &str = "already verified";

/// Verification failure
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The API could not be reached or answered garbage
    #[error("verification request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API refused the submission or the verification failed
    #[error("verification rejected: {0}")]
    Rejected(String),
    /// No API key configured
    #[error("no block explorer API key configured")]
    MissingApiKey,
    /// No source input configured
    #[error("no source input file configured")]
    MissingSource,
    /// Source input could not be read
    #[error("cannot read source input {}: {source}", .path.display())]
    Source {
        /// Configured source file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// Still pending after the last poll
    #[error("verification still pending after {0} polls")]
    Timeout(u32),
}

/// Successful verification outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Source accepted and verified now
    Verified,
    /// The explorer already knew the source
    AlreadyVerified,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: String,
}

/// Whether an explorer message means the contract was already verified
pub fn is_already_verified(message: &str) -> bool {
    message.to_lowercase().contains(ALREADY_VERIFIED)
}

/// Block explorer verification client
#[derive(Clone, Debug)]
pub struct Verifier {
    client: reqwest::Client,
    config: VerifyConfig,
}

impl Verifier {
    /// Create a verifier
    pub fn new(config: VerifyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Verify and log the outcome. Failures are logged, never returned.
    pub async fn verify(&self, address: Address, args: &[AbiValue]) {
        info!("Verifying contract...");
        match self.try_verify(address, args).await {
            Ok(VerifyOutcome::Verified) => info!("Verified {}", address),
            Ok(VerifyOutcome::AlreadyVerified) => info!("Already Verified!"),
            Err(e) if is_already_verified(&e.to_string()) => info!("Already Verified!"),
            Err(e) => error!("Verification of {} failed: {}", address, e),
        }
    }

    /// Submit the source of `address` and wait for the verdict
    pub async fn try_verify(&self, address: Address, args: &[AbiValue]) -> Result<VerifyOutcome, VerifyError> {
        let api_key = self.config.api_key.as_deref().ok_or(VerifyError::MissingApiKey)?;
        let path = self.config.source_file.as_ref().ok_or(VerifyError::MissingSource)?;
        let source = fs::read_to_string(path).map_err(|source| VerifyError::Source {
            path: path.clone(),
            source,
        })?;

        let address = address.to_checksum(None);
        let constructor_args = hex::encode(codec::encode(args));
        let form = [
            ("apikey", api_key),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", self.config.contract_name.as_str()),
            ("compilerversion", self.config.compiler_version.as_str()),
            // sic, the API's spelling
            ("constructorArguements", constructor_args.as_str()),
        ];

        let response: ApiResponse = self
            .client
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?
            .json()
            .await?;

        if response.status != "1" {
            if is_already_verified(&response.result) {
                return Ok(VerifyOutcome::AlreadyVerified);
            }
            return Err(VerifyError::Rejected(format!("{}: {}", response.message, response.result)));
        }

        let guid = response.result;
        info!("Verification submitted for {}, guid {}", address, guid);
        self.poll_status(api_key, &guid).await
    }

    async fn poll_status(&self, api_key: &str, guid: &str) -> Result<VerifyOutcome, VerifyError> {
        for attempt in 1..=self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;

            let response: ApiResponse = self
                .client
                .get(&self.config.api_url)
                .query(&[
                    ("apikey", api_key),
                    ("module", "contract"),
                    ("action", "checkverifystatus"),
                    ("guid", guid),
                ])
                .send()
                .await?
                .json()
                .await?;

            let verdict = response.result.to_lowercase();
            if verdict.contains(PENDING) {
                debug!("Verification pending (poll {}/{})", attempt, self.config.max_polls);
                continue;
            }
            if verdict.contains(PASS) {
                return Ok(VerifyOutcome::Verified);
            }
            if verdict.contains(ALREADY_VERIFIED) {
                return Ok(VerifyOutcome::AlreadyVerified);
            }
            return Err(VerifyError::Rejected(response.result));
        }
        Err(VerifyError::Timeout(self.config.max_polls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use axum::extract::{Query, State};
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Explorer {
        submit_result: Arc<Mutex<Value>>,
        statuses: Arc<Mutex<Vec<&'static str>>>,
        submitted: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    async fn submit(State(explorer): State<Explorer>, Form(form): Form<HashMap<String, String>>) -> Json<Value> {
        explorer.submitted.lock().unwrap().push(form);
        Json(explorer.submit_result.lock().unwrap().clone())
    }

    async fn status(State(explorer): State<Explorer>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
        assert_eq!(query.get("action").map(String::as_str), Some("checkverifystatus"));
        let mut statuses = explorer.statuses.lock().unwrap();
        let result = if statuses.is_empty() { "Pending in queue" } else { statuses.remove(0) };
        Json(json!({ "status": "1", "message": "OK", "result": result }))
    }

    async fn spawn_explorer(explorer: Explorer) -> String {
        let app = Router::new()
            .route("/api", post(submit).get(status))
            .with_state(explorer);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn verifier(api_url: String, source: &tempfile::NamedTempFile) -> Verifier {
        Verifier::new(VerifyConfig {
            api_url,
            api_key: Some("KEY".to_string()),
            source_file: Some(source.path().to_path_buf()),
            poll_interval: Duration::from_millis(5),
            max_polls: 3,
            ..VerifyConfig::default()
        })
    }

    fn source_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), r#"{"language":"Solidity","sources":{}}"#).unwrap();
        file
    }

    #[test]
    fn test_already_verified_ignores_case() {
        assert!(is_already_verified("Contract source code already verified"));
        assert!(is_already_verified("Already Verified!"));
        assert!(is_already_verified("ALREADY VERIFIED"));
        assert!(!is_already_verified("Fail - Unable to verify"));
    }

    #[tokio::test]
    async fn test_submit_then_poll_until_verified() {
        let explorer = Explorer::default();
        *explorer.submit_result.lock().unwrap() = json!({ "status": "1", "message": "OK", "result": "guid-1" });
        explorer.statuses.lock().unwrap().extend(["Pending in queue", "Pass - Verified"]);
        let url = spawn_explorer(explorer.clone()).await;
        let source = source_file();

        let args = [AbiValue::Address(Address::repeat_byte(1)), AbiValue::Uint(U256::from(30))];
        let outcome = verifier(url, &source)
            .try_verify(Address::repeat_byte(0xab), &args)
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);

        let submitted = explorer.submitted.lock().unwrap();
        let form = &submitted[0];
        assert_eq!(form["action"], "verifysourcecode");
        assert_eq!(form["constructorArguements"], hex::encode(codec::encode(&args)));
        assert_eq!(form["contractname"], "contracts/Lottery.sol:Lottery");
    }

    #[tokio::test]
    async fn test_already_verified_submission_is_success() {
        let explorer = Explorer::default();
        *explorer.submit_result.lock().unwrap() =
            json!({ "status": "0", "message": "NOTOK", "result": "Contract source code already verified" });
        let url = spawn_explorer(explorer).await;
        let source = source_file();

        let outcome = verifier(url, &source)
            .try_verify(Address::repeat_byte(0xab), &[])
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::AlreadyVerified);
    }

    #[tokio::test]
    async fn test_rejection_and_timeout_are_errors() {
        let explorer = Explorer::default();
        *explorer.submit_result.lock().unwrap() =
            json!({ "status": "0", "message": "NOTOK", "result": "Invalid API Key" });
        let url = spawn_explorer(explorer).await;
        let source = source_file();
        let err = verifier(url, &source)
            .try_verify(Address::ZERO, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Rejected(_)));

        let explorer = Explorer::default();
        *explorer.submit_result.lock().unwrap() = json!({ "status": "1", "message": "OK", "result": "guid-2" });
        let url = spawn_explorer(explorer).await;
        let err = verifier(url, &source)
            .try_verify(Address::ZERO, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Timeout(3)));
    }

    #[tokio::test]
    async fn test_verify_swallows_failures() {
        // nothing listens here
        let source = source_file();
        let verifier = verifier("http://127.0.0.1:9/api".to_string(), &source);
        verifier.verify(Address::ZERO, &[]).await;

        let no_key = Verifier::new(VerifyConfig::default());
        assert!(matches!(
            no_key.try_verify(Address::ZERO, &[]).await,
            Err(VerifyError::MissingApiKey)
        ));
    }
}
