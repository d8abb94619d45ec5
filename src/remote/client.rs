use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::{NewObservation, ObservationService, RemoteObservation};
use crate::config::ApiConfig;
use crate::error::{Result, UploadError};

/// Largest response body excerpt kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// Blocking client for the iNaturalist v1 API.
pub struct InatClient {
    http: Client,
    base_url: String,
    web_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultsPage<T> {
    #[serde(default)]
    total_results: Option<u64>,
    results: Vec<T>,
}

// Create answers either with the bare observation or with a results page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateResponse {
    Page(ResultsPage<RemoteObservation>),
    Bare(RemoteObservation),
}

impl InatClient {
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| UploadError::ClientSetup(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn require_token(&self) -> Result<()> {
        if self.token.is_none() {
            return Err(UploadError::MissingCredential(crate::TOKEN_ENV));
        }
        Ok(())
    }
}

/// Send and turn transport failures and non-2xx statuses into `RemoteTransient`.
fn send(what: &str, req: RequestBuilder) -> Result<Response> {
    let response = req
        .send()
        .map_err(|e| UploadError::RemoteTransient(format!("{} failed: {}", what, e)))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    Err(UploadError::RemoteTransient(format!(
        "{} failed: HTTP {}: {}",
        what,
        status.as_u16(),
        excerpt
    )))
}

fn parse<T: DeserializeOwned>(what: &str, response: Response) -> Result<T> {
    response
        .json()
        .map_err(|e| UploadError::RemoteTransient(format!("Failed to parse {} response: {}", what, e)))
}

impl ObservationService for InatClient {
    fn search_by_tag(&self, tag: &str, owner: Option<&str>) -> Result<Vec<RemoteObservation>> {
        let url = format!("{}/observations", self.base_url);

        let mut query = vec![("q", tag), ("search_on", "tags"), ("per_page", "200")];
        if let Some(owner) = owner {
            query.push(("user_id", owner));
        }

        let req = self.authorized(self.http.get(&url)).query(&query);
        let page: ResultsPage<RemoteObservation> =
            parse("search", send("Observation search", req)?)?;

        tracing::debug!(%tag, total = ?page.total_results, "Tag search finished");
        Ok(page.results)
    }

    fn fetch(&self, id: u64) -> Result<RemoteObservation> {
        let url = format!("{}/observations/{}", self.base_url, id);

        let req = self.authorized(self.http.get(&url));
        let page: ResultsPage<RemoteObservation> = parse("fetch", send("Observation fetch", req)?)?;

        page.results
            .into_iter()
            .next()
            .ok_or_else(|| UploadError::RemoteTransient(format!("Observation {} not found", id)))
    }

    fn create(&self, observation: &NewObservation) -> Result<RemoteObservation> {
        self.require_token()?;
        let url = format!("{}/observations", self.base_url);

        let req = self
            .authorized(self.http.post(&url))
            .json(&serde_json::json!({ "observation": observation }));

        match parse("create", send("Observation create", req)?)? {
            CreateResponse::Bare(obs) => Ok(obs),
            CreateResponse::Page(page) => page
                .results
                .into_iter()
                .next()
                .ok_or_else(|| UploadError::RemoteTransient("Create returned no observation".to_string())),
        }
    }

    fn attach_photo(&self, id: u64, photo: &Path) -> Result<()> {
        self.require_token()?;
        let url = format!("{}/observation_photos", self.base_url);

        let bytes = std::fs::read(photo)?;
        let file_name = photo
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "photo.jpg".to_string());
        let mime = mime_guess::from_path(photo).first_or_octet_stream();

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())
            .map_err(|e| UploadError::per_record(&photo.display().to_string(), e.to_string()))?;
        let form = multipart::Form::new()
            .text("observation_photo[observation_id]", id.to_string())
            .part("file", part);

        send("Photo upload", self.authorized(self.http.post(&url)).multipart(form))?;
        Ok(())
    }

    fn vote_wild(&self, id: u64, agree: bool) -> Result<()> {
        self.require_token()?;
        let url = format!("{}/observations/{}/quality/wild.json", self.web_url, id);

        let req = self
            .authorized(self.http.post(&url))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("agree", if agree { "true" } else { "false" })]);
        send("Wild vote", req)?;

        Ok(())
    }
}
