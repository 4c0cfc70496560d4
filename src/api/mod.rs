use crate::models::{Note, NotePatch, NoteSummary};
use crate::storage;
use crate::sync::DocumentStore;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (offline, DNS, CORS, aborted).
    #[error("network failure: {0}")]
    Network(String),

    /// The store answered with a non-2xx status.
    #[error("request failed ({status}): {body}")]
    Http { status: u16, body: String },

    /// The body was not the JSON shape we expected.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    fn network(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }

    fn parse(e: impl std::fmt::Display) -> Self {
        Self::InvalidResponse(e.to_string())
    }

    fn http(status: StatusCode, body: String) -> Self {
        Self::Http {
            status: status.as_u16(),
            body,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// The store itself rejected the write as conflicting.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone)]
pub struct ApiClient {
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn load_from_storage(base_url: String) -> Self {
        let mut client = Self::new(base_url);
        client.token = storage::load_token();
        client
    }

    pub fn save_to_storage(&self) {
        if let Some(token) = &self.token {
            storage::save_token(token);
        }
    }

    pub fn clear_storage() {
        storage::clear_token();
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn get_token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    fn get_auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn note_url(&self, note_id: &str) -> String {
        format!("{}/api/notes/{}", self.base_url, urlencoding::encode(note_id))
    }

    async fn request_api<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<&impl Serialize>,
    ) -> ApiResult<T> {
        let client = reqwest::Client::new();
        let mut req = client.request(method, url);
        if let Some(header) = self.get_auth_header() {
            req = req.header("Authorization", header);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let res = req.send().await.map_err(ApiError::network)?;
        let status = res.status();
        // Reading the body can still fail mid-stream; that is a transport problem.
        let text = res.text().await.map_err(ApiError::network)?;

        if !status.is_success() {
            return Err(ApiError::http(status, text));
        }
        Self::parse_body(&text)
    }

    pub(crate) fn parse_body<T: DeserializeOwned>(text: &str) -> ApiResult<T> {
        serde_json::from_str(text).map_err(ApiError::parse)
    }
}

#[async_trait(?Send)]
impl DocumentStore for ApiClient {
    async fn fetch_note(&self, note_id: &str) -> ApiResult<Note> {
        self.request_api(Method::GET, self.note_url(note_id), None::<&()>)
            .await
    }

    async fn save_note(&self, note_id: &str, patch: &NotePatch) -> ApiResult<Note> {
        self.request_api(Method::PUT, self.note_url(note_id), Some(patch))
            .await
    }

    async fn fetch_note_index(&self) -> ApiResult<Vec<NoteSummary>> {
        self.request_api(
            Method::GET,
            format!("{}/api/notes", self.base_url),
            None::<&()>,
        )
        .await
    }
}
