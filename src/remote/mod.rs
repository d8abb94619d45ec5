pub mod client;

#[cfg(test)]
pub(crate) mod fake;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

pub use client::InatClient;

/// Observation as returned by the API. Only the fields the uploader reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteObservation {
    pub id: u64,

    #[serde(default)]
    pub uuid: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub photos: Vec<serde_json::Value>,

    #[serde(default)]
    pub captive: Option<bool>,
}

impl RemoteObservation {
    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Payload of the create call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewObservation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species_guess: Option<String>,

    #[serde(rename = "observed_on_string", skip_serializing_if = "Option::is_none")]
    pub observed_on: Option<String>,

    pub latitude: f64,
    pub longitude: f64,

    /// Comma-joined tags, always including the uniqueness tag.
    pub tag_list: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Operations the uploader needs from the observation service.
pub trait ObservationService {
    /// Observations whose tags match `tag`, optionally restricted to one owner.
    fn search_by_tag(&self, tag: &str, owner: Option<&str>) -> Result<Vec<RemoteObservation>>;

    fn fetch(&self, id: u64) -> Result<RemoteObservation>;

    fn create(&self, observation: &NewObservation) -> Result<RemoteObservation>;

    /// Upload one photo. Success only means the request completed; confirm
    /// with [`ObservationService::photo_count`].
    fn attach_photo(&self, id: u64, photo: &Path) -> Result<()>;

    /// Cast the "wild" data quality vote; `agree = false` marks captive.
    fn vote_wild(&self, id: u64, agree: bool) -> Result<()>;

    fn photo_count(&self, id: u64) -> Result<usize> {
        Ok(self.fetch(id)?.photo_count())
    }
}

/// Looks up an existing remote observation through its uniqueness tag.
pub struct Deduplicator<'a> {
    service: &'a dyn ObservationService,
    owner: Option<String>,
}

impl<'a> Deduplicator<'a> {
    pub fn new(service: &'a dyn ObservationService, owner: Option<String>) -> Self {
        Self { service, owner }
    }

    /// First result carrying exactly `tag`. Results without a tag list are
    /// trusted to match, since the search itself filtered on tags.
    pub fn find_existing(&self, tag: &str) -> Result<Option<RemoteObservation>> {
        let results = self.service.search_by_tag(tag, self.owner.as_deref())?;
        Ok(results
            .into_iter()
            .find(|obs| obs.tags.is_empty() || obs.has_tag(tag)))
    }
}
