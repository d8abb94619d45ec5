//! In-memory observation service with scripted failures.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;

use super::{NewObservation, ObservationService, RemoteObservation};
use crate::error::{Result, UploadError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub search: usize,
    pub fetch: usize,
    pub create: usize,
    pub attach: usize,
    pub vote: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Error returned, nothing happened remotely.
    Rejected,
    /// Error returned, but the write went through.
    LostResponse,
    /// Ok returned, but nothing happened remotely.
    Dropped,
}

#[derive(Default)]
pub struct FakeService {
    observations: RefCell<Vec<RemoteObservation>>,
    next_id: Cell<u64>,
    calls: RefCell<Calls>,
    create_failures: RefCell<VecDeque<Failure>>,
    attach_failures: RefCell<VecDeque<Failure>>,
    pub votes: RefCell<Vec<(u64, bool)>>,
    pub vote_fails: Cell<bool>,
}

impl FakeService {
    pub fn new() -> Self {
        let service = Self::default();
        service.next_id.set(1000);
        service
    }

    /// Add an existing observation carrying `tag` with `photos` photos.
    pub fn seed(&self, tag: &str, photos: usize) -> u64 {
        let id = self.allocate_id();
        self.observations.borrow_mut().push(RemoteObservation {
            id,
            uuid: Some(format!("uuid-{id}")),
            tags: vec![tag.to_string()],
            photos: (0..photos).map(|n| serde_json::json!({ "id": n })).collect(),
            captive: None,
        });
        id
    }

    pub fn fail_next_create(&self, failure: Failure) {
        self.create_failures.borrow_mut().push_back(failure);
    }

    pub fn fail_next_attach(&self, failure: Failure) {
        self.attach_failures.borrow_mut().push_back(failure);
    }

    pub fn calls(&self) -> Calls {
        *self.calls.borrow()
    }

    pub fn observation_count(&self) -> usize {
        self.observations.borrow().len()
    }

    pub fn photos_of(&self, id: u64) -> usize {
        self.observations
            .borrow()
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.photo_count())
            .unwrap_or(0)
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn add_photo(&self, id: u64) {
        if let Some(obs) = self.observations.borrow_mut().iter_mut().find(|o| o.id == id) {
            let n = obs.photos.len();
            obs.photos.push(serde_json::json!({ "id": n }));
        }
    }
}

impl ObservationService for FakeService {
    // Loose like the real full-text search: anything sharing the tag key matches.
    fn search_by_tag(&self, tag: &str, _owner: Option<&str>) -> Result<Vec<RemoteObservation>> {
        self.calls.borrow_mut().search += 1;
        let key = tag.split(':').next().unwrap_or(tag);
        Ok(self
            .observations
            .borrow()
            .iter()
            .filter(|o| o.tags.iter().any(|t| t.starts_with(key)))
            .cloned()
            .collect())
    }

    fn fetch(&self, id: u64) -> Result<RemoteObservation> {
        self.calls.borrow_mut().fetch += 1;
        self.observations
            .borrow()
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or_else(|| UploadError::RemoteTransient(format!("HTTP 404: observation {id}")))
    }

    fn create(&self, observation: &NewObservation) -> Result<RemoteObservation> {
        self.calls.borrow_mut().create += 1;
        let failure = self.create_failures.borrow_mut().pop_front();

        if let Some(Failure::Rejected) = failure {
            return Err(UploadError::RemoteTransient("HTTP 503".to_string()));
        }

        let id = self.allocate_id();
        let created = RemoteObservation {
            id,
            uuid: Some(format!("uuid-{id}")),
            tags: observation.tag_list.split(',').map(str::to_string).collect(),
            photos: Vec::new(),
            captive: None,
        };

        if let Some(Failure::Dropped) = failure {
            return Ok(created);
        }

        self.observations.borrow_mut().push(created.clone());

        match failure {
            Some(Failure::LostResponse) => Err(UploadError::RemoteTransient("timed out".to_string())),
            _ => Ok(created),
        }
    }

    fn attach_photo(&self, id: u64, _photo: &Path) -> Result<()> {
        self.calls.borrow_mut().attach += 1;
        match self.attach_failures.borrow_mut().pop_front() {
            Some(Failure::Rejected) => Err(UploadError::RemoteTransient("HTTP 502".to_string())),
            Some(Failure::LostResponse) => {
                self.add_photo(id);
                Err(UploadError::RemoteTransient("timed out".to_string()))
            }
            Some(Failure::Dropped) => Ok(()),
            None => {
                self.add_photo(id);
                Ok(())
            }
        }
    }

    fn vote_wild(&self, id: u64, agree: bool) -> Result<()> {
        self.calls.borrow_mut().vote += 1;
        if self.vote_fails.get() {
            return Err(UploadError::RemoteTransient("HTTP 422".to_string()));
        }
        self.votes.borrow_mut().push((id, agree));
        Ok(())
    }
}
