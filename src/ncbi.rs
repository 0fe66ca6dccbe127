use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::KiraError;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const TOOL_NAME: &str = "kira-ri";

/// Server-side history of one esearch. Built once, then only read by the
/// page fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSession {
    database: String,
    count: usize,
    ids: Vec<String>,
    web_env: String,
    query_key: String,
}

impl WebSession {
    pub fn new(
        database: impl Into<String>,
        count: usize,
        ids: Vec<String>,
        web_env: impl Into<String>,
        query_key: impl Into<String>,
    ) -> Result<Self, KiraError> {
        if count != ids.len() {
            return Err(KiraError::SessionCountMismatch {
                count,
                ids: ids.len(),
            });
        }
        Ok(Self {
            database: database.into(),
            count,
            ids,
            web_env: web_env.into(),
            query_key: query_key.into(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn web_env(&self) -> &str {
        &self.web_env
    }

    pub fn query_key(&self) -> &str {
        &self.query_key
    }
}

pub trait EntrezClient {
    fn search(&self, query: &str, database: &str) -> Result<WebSession, KiraError>;

    /// Raw FASTA text for `[start, start + size)` of the session.
    /// 5xx responses come back as `KiraError::NcbiStatus`.
    fn fetch_page(
        &self,
        session: &WebSession,
        start: usize,
        size: usize,
    ) -> Result<String, KiraError>;
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    base_url: String,
    email: Option<String>,
    api_key: Option<String>,
}

impl EntrezHttpClient {
    pub fn new(email: Option<String>, api_key: Option<String>) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-ri/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::NcbiHttp(err.to_string()))?,
        );

        let api_key = api_key
            .or_else(|| std::env::var("NCBI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty());

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| KiraError::NcbiHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            email,
            api_key,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn etiquette(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", TOOL_NAME.to_string())];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.trim().to_string()));
        }
        params
    }

    fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::blocking::Response, KiraError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&self.etiquette())
            .send()
            .map_err(|err| KiraError::NcbiHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(KiraError::NcbiStatus { status, message });
        }
        Ok(response)
    }

    fn esearch(
        &self,
        query: &str,
        database: &str,
        retmax: Option<usize>,
    ) -> Result<Value, KiraError> {
        let mut params = vec![
            ("db", database.to_string()),
            ("term", query.to_string()),
            ("retmode", "json".to_string()),
        ];
        if let Some(retmax) = retmax {
            params.push(("retmax", retmax.to_string()));
            params.push(("usehistory", "y".to_string()));
        }
        let payload: Value = self
            .get("esearch.fcgi", &params)?
            .json()
            .map_err(|err| KiraError::NcbiHttp(err.to_string()))?;
        Ok(payload)
    }
}

impl EntrezClient for EntrezHttpClient {
    fn search(&self, query: &str, database: &str) -> Result<WebSession, KiraError> {
        let probe = self.esearch(query, database, None)?;
        let count = parse_count(&probe)?;
        tracing::debug!(query, database, count, "esearch count");

        let history = self.esearch(query, database, Some(count))?;
        session_from_esearch(database, &history)
    }

    fn fetch_page(
        &self,
        session: &WebSession,
        start: usize,
        size: usize,
    ) -> Result<String, KiraError> {
        let params = [
            ("db", session.database().to_string()),
            ("rettype", "fasta".to_string()),
            ("retmode", "text".to_string()),
            ("retstart", start.to_string()),
            ("retmax", size.to_string()),
            ("WebEnv", session.web_env().to_string()),
            ("query_key", session.query_key().to_string()),
        ];
        self.get("efetch.fcgi", &params)?
            .text()
            .map_err(|err| KiraError::NcbiHttp(err.to_string()))
    }
}

fn parse_count(payload: &Value) -> Result<usize, KiraError> {
    payload["esearchresult"]["count"]
        .as_str()
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| KiraError::NcbiHttp("esearch response without count".to_string()))
}

/// Builds a session from an esearch JSON payload issued with
/// `usehistory=y`.
pub fn session_from_esearch(database: &str, payload: &Value) -> Result<WebSession, KiraError> {
    let result = &payload["esearchresult"];
    let count = parse_count(payload)?;
    let ids = result["idlist"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let web_env = result["webenv"]
        .as_str()
        .ok_or_else(|| KiraError::NcbiHttp("esearch response without webenv".to_string()))?;
    let query_key = result["querykey"]
        .as_str()
        .ok_or_else(|| KiraError::NcbiHttp("esearch response without querykey".to_string()))?;
    WebSession::new(database, count, ids, web_env, query_key)
}
