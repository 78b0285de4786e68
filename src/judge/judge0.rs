// src/judge/judge0.rs

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{
    config::Config,
    error::AppError,
    judge::{JudgeCase, JudgeClient, JudgeRun},
};

const RESULT_FIELDS: &str = "status,stdout,stderr,compile_output,message,time,memory";

/// HTTP adapter for a Judge0-compatible executor.
/// Every free-text field travels base64-encoded in both directions.
#[derive(Clone)]
pub struct Judge0Client {
    http: Client,
    base_url: Url,
    auth_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireSubmission {
    language_id: i32,
    source_code: String,
    stdin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_output: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireBatch {
    submissions: Vec<WireSubmission>,
}

#[derive(Debug, Deserialize)]
struct WireToken {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    id: i32,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    status: Option<WireStatus>,
    status_id: Option<i32>,
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    message: Option<String>,
    time: Option<Value>,
    memory: Option<i64>,
}

impl Judge0Client {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(config.judge_request_timeout)
            .build()
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.judge_url.clone(),
            auth_token: config.judge_auth_token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::InternalServerError(format!("bad judge endpoint {}: {}", path, e)))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => req.header("X-Auth-Token", token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, AppError> {
        let response = self.authorize(req).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "judge responded {}: {}",
                status, body
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

fn encode(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decodes an optional base64 field. The judge wraps long payloads with
/// newlines, so whitespace is stripped first.
fn decode(field: Option<String>) -> Result<Option<String>, AppError> {
    match field {
        None => Ok(None),
        Some(raw) => {
            let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD.decode(compact)?;
            Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

fn parse_seconds(value: Option<Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn to_wire(case: &JudgeCase) -> WireSubmission {
    WireSubmission {
        language_id: case.language_id,
        source_code: encode(&case.source_code),
        stdin: encode(&case.stdin),
        expected_output: case.expected_output.as_deref().map(encode),
    }
}

fn from_wire(wire: WireResult) -> Result<JudgeRun, AppError> {
    let status_id = wire
        .status
        .map(|s| s.id)
        .or(wire.status_id)
        .ok_or_else(|| AppError::ExternalService("judge result has no status".to_string()))?;

    Ok(JudgeRun {
        status_id,
        stdout: decode(wire.stdout)?,
        stderr: decode(wire.stderr)?,
        compile_output: decode(wire.compile_output)?,
        message: decode(wire.message)?,
        time_seconds: parse_seconds(wire.time),
        memory_kb: wire.memory,
    })
}

#[async_trait]
impl JudgeClient for Judge0Client {
    async fn submit_batch(&self, cases: &[JudgeCase]) -> Result<Vec<String>, AppError> {
        let url = self.endpoint("submissions/batch")?;
        let body = WireBatch {
            submissions: cases.iter().map(to_wire).collect(),
        };

        let tokens: Vec<WireToken> = self
            .send(
                self.http
                    .post(url)
                    .query(&[("base64_encoded", "true")])
                    .json(&body),
            )
            .await?;

        if tokens.len() != cases.len() {
            return Err(AppError::ExternalService(format!(
                "judge returned {} tokens for {} cases",
                tokens.len(),
                cases.len()
            )));
        }

        tokens
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                t.token.ok_or_else(|| {
                    AppError::ExternalService(format!("judge rejected case #{}", i + 1))
                })
            })
            .collect()
    }

    async fn poll_one(&self, token: &str) -> Result<JudgeRun, AppError> {
        let url = self.endpoint(&format!("submissions/{}", token))?;
        let wire: WireResult = self
            .send(
                self.http
                    .get(url)
                    .query(&[("base64_encoded", "true"), ("fields", RESULT_FIELDS)]),
            )
            .await?;
        from_wire(wire)
    }

    async fn submit_synchronous(
        &self,
        language_id: i32,
        source_code: &str,
        stdin: &str,
    ) -> Result<JudgeRun, AppError> {
        let url = self.endpoint("submissions")?;
        let body = WireSubmission {
            language_id,
            source_code: encode(source_code),
            stdin: encode(stdin),
            expected_output: None,
        };
        let wire: WireResult = self
            .send(
                self.http
                    .post(url)
                    .query(&[
                        ("base64_encoded", "true"),
                        ("wait", "true"),
                        ("fields", RESULT_FIELDS),
                    ])
                    .json(&body),
            )
            .await?;
        from_wire(wire)
    }
}
