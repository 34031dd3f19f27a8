use crate::domain::models::{AttestationDetail, Fields, RawTrail};
use crate::error::FetchError;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Read-only view of the trail API the document builder depends on.
///
/// Implementations are shared across rehydration workers, hence `Sync`.
pub trait TrailSource: Sync {
    fn fetch_trail(&self, name: &str) -> Result<RawTrail, FetchError>;
    fn fetch_attestation_detail(&self, id: &str) -> Result<AttestationDetail, FetchError>;
}

pub struct ApiClient {
    http: Client,
    host: Url,
    org: String,
    flow: String,
    token: String,
}

#[derive(Deserialize)]
struct DetailEnvelope {
    #[serde(default)]
    data: Vec<Fields>,
}

impl ApiClient {
    pub fn new(
        host: &str,
        org: &str,
        flow: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let parsed = Url::parse(host).map_err(|_| FetchError::Url(host.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(FetchError::Url(host.to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trailgate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            host: parsed,
            org: org.to_string(),
            flow: flow.to_string(),
            token: token.to_string(),
        })
    }

    pub fn trail_url(&self, trail: &str) -> Result<Url, FetchError> {
        self.endpoint(&["api", "v2", "trails", &self.org, &self.flow, trail])
    }

    pub fn attestation_url(&self, id: &str) -> Result<Url, FetchError> {
        let mut url = self.endpoint(&["api", "v2", "attestations", &self.org])?;
        url.query_pairs_mut().append_pair("attestation_id", id);
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.host.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Url(self.host.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: &Url) -> Result<(StatusCode, String), FetchError> {
        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        debug!(%url, status = status.as_u16(), "api request");
        Ok((status, body))
    }
}

impl TrailSource for ApiClient {
    fn fetch_trail(&self, name: &str) -> Result<RawTrail, FetchError> {
        let url = self.trail_url(name)?;
        let (status, body) = self.get(&url)?;
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::TrailNotFound {
                trail: name.to_string(),
                org: self.org.clone(),
                flow: self.flow.clone(),
            });
        }
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        let mut trail: RawTrail =
            serde_json::from_str(&body).map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            })?;
        if trail.flow.is_none() {
            trail.flow = Some(self.flow.clone());
        }
        Ok(trail)
    }

    fn fetch_attestation_detail(&self, id: &str) -> Result<AttestationDetail, FetchError> {
        let url = self.attestation_url(id)?;
        let (status, body) = self.get(&url)?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        let envelope: DetailEnvelope =
            serde_json::from_str(&body).map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            })?;
        let fields = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::EmptyDetail(id.to_string()))?;
        Ok(AttestationDetail {
            attestation_id: id.to_string(),
            fields,
        })
    }
}

/// Builds the user-facing error for a non-2xx response.
///
/// The server answers with `{"message": ..., "errors": [...]}`, a bare JSON
/// string, or something else entirely; the message loses any trailing
/// "You have requested ..." hint.
pub fn api_error(status: u16, body: &str) -> FetchError {
    let message = match serde_json::from_str::<Value>(body) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => match map.get("message").and_then(Value::as_str) {
            Some(m) => {
                let m = m.split("You have requested").next().unwrap_or(m).trim_end();
                match map.get("errors") {
                    Some(errors) => format!("{m}: {errors}"),
                    None => m.to_string(),
                }
            }
            None => Value::Object(map.clone()).to_string(),
        },
        _ if body.trim().is_empty() => format!("request failed with status {status}"),
        _ => body.trim().to_string(),
    };
    FetchError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::{api_error, ApiClient};
    use crate::error::FetchError;
    use std::time::Duration;

    fn client(host: &str) -> ApiClient {
        ApiClient::new(host, "acme", "release flow", "secret", Duration::from_secs(5))
            .expect("client builds")
    }

    #[test]
    fn trail_url_encodes_path_segments() {
        let c = client("https://app.example.com");
        assert_eq!(
            c.trail_url("feature/x 1").unwrap().as_str(),
            "https://app.example.com/api/v2/trails/acme/release%20flow/feature%2Fx%201"
        );
    }

    #[test]
    fn host_with_path_prefix_and_trailing_slash_is_kept() {
        let c = client("http://localhost:8001/kosli/");
        assert_eq!(
            c.attestation_url("att-1").unwrap().as_str(),
            "http://localhost:8001/kosli/api/v2/attestations/acme?attestation_id=att-1"
        );
    }

    #[test]
    fn invalid_host_is_rejected() {
        let err = ApiClient::new("not a url", "o", "f", "t", Duration::from_secs(1))
            .err()
            .expect("invalid host");
        assert!(matches!(err, FetchError::Url(_)));
    }

    #[test]
    fn api_error_strips_hint_and_appends_errors() {
        let err = api_error(
            400,
            r#"{"message": "Input payload validation failed. You have requested this URI", "errors": {"name": "bad"}}"#,
        );
        assert_eq!(
            err.to_string(),
            r#"Input payload validation failed.: {"name":"bad"}"#
        );
    }

    #[test]
    fn api_error_uses_plain_string_and_raw_bodies() {
        assert_eq!(api_error(403, r#""Forbidden""#).to_string(), "Forbidden");
        assert_eq!(api_error(502, "Bad Gateway\n").to_string(), "Bad Gateway");
        assert_eq!(
            api_error(500, "").to_string(),
            "request failed with status 500"
        );
    }
}
