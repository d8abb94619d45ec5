//! Upload orchestration.
//!
//! Each eligible record runs through
//! `Pending -> Deduplicating -> Creating -> AttachingPhotos -> Complete`.
//! Progress is written to the [`StateStore`] after every change, so a killed
//! run resumes from the same machine: complete samples short-circuit and
//! partially uploaded ones continue with the photos not yet confirmed.
//!
//! Failures never abort the batch. They end the current sample in
//! [`Outcome::Failed`] and leave enough state for a safe re-run.

pub mod params;
pub mod retry;

use std::collections::HashSet;
use std::fmt;

use crate::error::{Result, UploadError};
use crate::geo::CoordinateResolver;
use crate::records::{Row, RowExtractor, UploadRecord, Wildness};
use crate::remote::{Deduplicator, ObservationService, RemoteObservation};
use crate::scanner::{LocalPhoto, PhotoLocator};
use crate::state::StateStore;

use retry::{Attempt, RetryPolicy, Sleeper, ThreadSleeper};

/// Run-wide settings, fixed for the lifetime of an [`Uploader`].
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dry_run: bool,
    /// Tag search before creating. The index poll after a failed create always runs.
    pub dedupe_remote: bool,
    /// Re-fetch completed observations and log their captive flag.
    pub verify: bool,
    /// Restrict tag searches to this user's observations.
    pub owner: Option<String>,
    pub source_tag: String,
    pub create_policy: RetryPolicy,
    pub poll_policy: RetryPolicy,
    pub photo_policy: RetryPolicy,
}

/// Abort before any remote call when a live run has no token.
pub fn check_credential(settings: &UploadSettings, token: Option<&str>) -> Result<()> {
    let has_token = token.map(|t| !t.trim().is_empty()).unwrap_or(false);
    if !settings.dry_run && !has_token {
        return Err(UploadError::MissingCredential(crate::TOKEN_ENV));
    }
    Ok(())
}

/// Pick the first non-blank token, preferring the current variable name.
pub fn resolve_token(current: Option<String>, legacy: Option<String>) -> Option<String> {
    current
        .into_iter()
        .chain(legacy)
        .find(|t| !t.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Deduplicating,
    Creating,
    AttachingPhotos,
    Complete,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Deduplicating => "deduplicating",
            Stage::Creating => "creating",
            Stage::AttachingPhotos => "attaching photos",
            Stage::Complete => "complete",
            Stage::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum SkipReason {
    NotFlagged,
    Malformed(UploadError),
    Unresolvable(UploadError),
    NoPhotos,
}

#[derive(Debug)]
pub enum Outcome {
    Completed { remote_id: u64, attached: usize },
    AlreadyComplete,
    DryRun,
    Skipped(SkipReason),
    /// Every local photo is recorded but the remote holds fewer.
    Incomplete {
        remote_id: u64,
        remote_photos: usize,
        local_photos: usize,
    },
    /// `stage` is where the sample stopped; it now sits in [`Stage::Error`].
    Failed { stage: Stage, error: UploadError },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub already_complete: usize,
    pub dry_run: usize,
    pub skipped: usize,
    pub incomplete: usize,
    pub failed: usize,
    pub photos_attached: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Completed { attached, .. } => {
                self.completed += 1;
                self.photos_attached += attached;
            }
            Outcome::AlreadyComplete => self.already_complete += 1,
            Outcome::DryRun => self.dry_run += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Incomplete { .. } => self.incomplete += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

struct StepFailure {
    stage: Stage,
    error: UploadError,
}

type Step<T> = std::result::Result<T, StepFailure>;

trait AtStage<T> {
    fn at(self, stage: Stage) -> Step<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> Step<T> {
        self.map_err(|error| StepFailure { stage, error })
    }
}

pub struct Uploader<'a> {
    settings: UploadSettings,
    service: &'a dyn ObservationService,
    store: StateStore,
    resolver: CoordinateResolver,
    locator: PhotoLocator,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Uploader<'a> {
    pub fn new(
        settings: UploadSettings,
        service: &'a dyn ObservationService,
        store: StateStore,
        resolver: CoordinateResolver,
        locator: PhotoLocator,
    ) -> Self {
        Self {
            settings,
            service,
            store,
            resolver,
            locator,
            sleeper: &ThreadSleeper,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Process every row in order. `limit` caps the number of eligible records.
    pub fn run(&mut self, rows: &[Row], extractor: &RowExtractor, limit: Option<usize>) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut eligible = 0usize;

        for (index, row) in rows.iter().enumerate() {
            let row_number = index + 1;

            let record = match extractor.extract(row_number, row) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(row = row_number, error = %e, "Skipping row");
                    summary.record(&Outcome::Skipped(SkipReason::Malformed(e)));
                    continue;
                }
            };

            if !record.upload {
                tracing::debug!(sample_id = %record.sample_id, "Not flagged for upload");
                continue;
            }

            if limit.is_some_and(|max| eligible >= max) {
                tracing::info!(limit = eligible, "Record limit reached");
                break;
            }
            eligible += 1;

            let sample_id = record.sample_id.clone();
            let outcome = self.process(record);
            log_outcome(&sample_id, &outcome);
            summary.record(&outcome);
        }

        summary
    }

    /// Drive one record through the state machine.
    pub fn process(&mut self, mut record: UploadRecord) -> Outcome {
        if !record.upload {
            return Outcome::Skipped(SkipReason::NotFlagged);
        }

        // Pending: complete samples are never resubmitted
        if self.store.is_complete(&record.sample_id) {
            return Outcome::AlreadyComplete;
        }

        let location = match self.resolver.resolve(&record) {
            Ok(location) => location,
            Err(e) => return Outcome::Skipped(SkipReason::Unresolvable(e)),
        };
        record.location = Some(location);

        let photos = match self.locator.locate_keyed(&record.sample_id) {
            Ok(photos) => photos,
            Err(e) => {
                return Outcome::Failed {
                    stage: Stage::Pending,
                    error: UploadError::per_record(&record.sample_id, e.to_string()),
                }
            }
        };
        if photos.is_empty() {
            tracing::warn!(
                sample_id = %record.sample_id,
                dir = %self.locator.sample_dir(&record.sample_id).display(),
                "No photos found"
            );
            return Outcome::Skipped(SkipReason::NoPhotos);
        }

        if self.settings.dry_run {
            let params = params::build_observation(&record, location, &self.settings.source_tag);
            let names: Vec<String> = photos.iter().map(LocalPhoto::file_name).collect();
            tracing::info!(
                sample_id = %record.sample_id,
                taxon = ?params.species_guess,
                observed_on = ?params.observed_on,
                lat = params.latitude,
                lon = params.longitude,
                tags = %params.tag_list,
                photos = ?names,
                "Dry-run: would create observation"
            );
            return Outcome::DryRun;
        }

        match self.upload(&record, location, &photos) {
            Ok(outcome) => outcome,
            Err(StepFailure { stage, error }) => Outcome::Failed { stage, error },
        }
    }

    fn upload(
        &mut self,
        record: &UploadRecord,
        location: (f64, f64),
        photos: &[LocalPhoto],
    ) -> Step<Outcome> {
        let remote_id = self.ensure_remote(record, location)?;

        self.vote_once(&record.sample_id, remote_id, record.wildness);

        let outcome = self.attach_photos(&record.sample_id, remote_id, photos)?;

        if self.settings.verify {
            if let Outcome::Completed { remote_id, .. } = &outcome {
                self.verify(&record.sample_id, *remote_id);
            }
        }

        Ok(outcome)
    }

    /// Deduplicating + Creating. Returns the remote id once the observation exists.
    fn ensure_remote(&mut self, record: &UploadRecord, location: (f64, f64)) -> Step<u64> {
        let sample_id = &record.sample_id;

        // Resume: a previous run already created or found it
        if let Some(id) = self.store.get(sample_id).and_then(|s| s.id) {
            tracing::debug!(%sample_id, id, "Resuming with stored remote id");
            return Ok(id);
        }

        let tag = record.unique_tag();

        if self.settings.dedupe_remote {
            let dedupe = Deduplicator::new(self.service, self.settings.owner.clone());
            match dedupe.find_existing(&tag) {
                Ok(Some(existing)) => {
                    tracing::info!(%sample_id, id = existing.id, "Found existing remote observation");
                    self.remember_remote(sample_id, &existing)
                        .at(Stage::Deduplicating)?;
                    return Ok(existing.id);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(%sample_id, error = %e, "Remote dedupe failed, continuing to create");
                }
            }
        }

        let created = self.create_with_recovery(record, location, &tag)?;
        tracing::info!(%sample_id, id = created.id, uuid = ?created.uuid, "Created observation");
        self.remember_remote(sample_id, &created).at(Stage::Creating)?;
        Ok(created.id)
    }

    /// Create, and after every failed attempt poll the index for a create
    /// whose response was lost before trying again.
    fn create_with_recovery(
        &self,
        record: &UploadRecord,
        location: (f64, f64),
        tag: &str,
    ) -> Step<RemoteObservation> {
        let params = params::build_observation(record, location, &self.settings.source_tag);
        let sample_id = &record.sample_id;

        self.settings
            .create_policy
            .run(self.sleeper, |attempt| match self.service.create(&params) {
                Ok(created) => Attempt::Done(created),
                Err(e) => {
                    tracing::warn!(%sample_id, attempt, error = %e, "Create failed, probing for a lost response");
                    match self.poll_index(tag) {
                        Some(found) => {
                            tracing::info!(%sample_id, id = found.id, "Create had succeeded remotely");
                            Attempt::Done(found)
                        }
                        None => Attempt::Retry(e.to_string()),
                    }
                }
            })
            .map_err(|exhausted| UploadError::per_record(sample_id, exhausted.to_string()))
            .at(Stage::Creating)
    }

    fn poll_index(&self, tag: &str) -> Option<RemoteObservation> {
        let dedupe = Deduplicator::new(self.service, self.settings.owner.clone());
        self.settings
            .poll_policy
            .run(self.sleeper, |_| match dedupe.find_existing(tag) {
                Ok(Some(found)) => Attempt::Done(found),
                Ok(None) => Attempt::Retry("not indexed".to_string()),
                Err(e) => Attempt::Retry(e.to_string()),
            })
            .ok()
    }

    fn remember_remote(&mut self, sample_id: &str, remote: &RemoteObservation) -> Result<()> {
        self.store.update(sample_id, |state| {
            state.id = Some(remote.id);
            if remote.uuid.is_some() {
                state.uuid = remote.uuid.clone();
            }
        })
    }

    /// Orthogonal to the photo stages: failures are logged and change nothing.
    fn vote_once(&mut self, sample_id: &str, remote_id: u64, wildness: Wildness) {
        let Some(agree) = wildness.vote() else {
            return;
        };
        if self.store.get(sample_id).is_some_and(|s| s.wild_voted) {
            return;
        }

        match self.service.vote_wild(remote_id, agree) {
            Ok(()) => {
                tracing::debug!(%sample_id, remote_id, agree, "Wild vote cast");
                if let Err(e) = self.store.update(sample_id, |s| s.wild_voted = true) {
                    tracing::warn!(%sample_id, error = %e, "Failed to persist wild vote");
                }
            }
            Err(e) => tracing::warn!(%sample_id, remote_id, error = %e, "Wild vote failed"),
        }
    }

    fn fresh_photo_count(&self, remote_id: u64) -> Result<usize> {
        self.settings
            .photo_policy
            .run(self.sleeper, |_| match self.service.photo_count(remote_id) {
                Ok(count) => Attempt::Done(count),
                Err(e) => Attempt::Retry(e.to_string()),
            })
            .map_err(|exhausted| UploadError::RemoteTransient(exhausted.to_string()))
    }

    /// AttachingPhotos -> Complete.
    fn attach_photos(
        &mut self,
        sample_id: &str,
        remote_id: u64,
        photos: &[LocalPhoto],
    ) -> Step<Outcome> {
        // Byte-identical files share a key and count as one photo
        let mut seen = HashSet::new();
        let photos: Vec<&LocalPhoto> = photos
            .iter()
            .filter(|photo| seen.insert(photo.key.as_str()))
            .collect();
        let local_count = photos.len();

        let mut remote_count = self
            .fresh_photo_count(remote_id)
            .at(Stage::AttachingPhotos)?;

        if remote_count >= local_count {
            tracing::info!(%sample_id, remote_count, local_count, "Remote already has every photo");
            self.mark_complete(sample_id, &photos)
                .at(Stage::AttachingPhotos)?;
            return Ok(Outcome::Completed {
                remote_id,
                attached: 0,
            });
        }

        let mut attached = 0;

        for photo in &photos {
            let key = photo.key.as_str();
            if self.store.get(sample_id).is_some_and(|s| s.has_photo(key)) {
                tracing::debug!(%sample_id, photo = %photo.file_name(), "Already uploaded");
                continue;
            }
            if photo.key.is_fallback() {
                tracing::warn!(%sample_id, photo = %photo.file_name(), "Tracking photo by name and size only");
            }

            let before = remote_count;
            let confirmed = self.settings.photo_policy.run(self.sleeper, |attempt| {
                if let Err(e) = self.service.attach_photo(remote_id, &photo.path) {
                    tracing::warn!(%sample_id, photo = %photo.file_name(), attempt, error = %e, "Photo upload errored");
                }
                match self.service.photo_count(remote_id) {
                    Ok(count) if count > before => Attempt::Done(count),
                    Ok(count) => Attempt::Retry(format!("remote photo count still {}", count)),
                    Err(e) => Attempt::Retry(e.to_string()),
                }
            });

            match confirmed {
                Ok(count) => {
                    remote_count = count;
                    attached += 1;
                    tracing::info!(%sample_id, photo = %photo.file_name(), remote_count, "Photo confirmed");
                    self.store
                        .update(sample_id, |state| {
                            state.record_photo(key);
                        })
                        .at(Stage::AttachingPhotos)?;
                }
                Err(exhausted) => {
                    return Err(StepFailure {
                        stage: Stage::AttachingPhotos,
                        error: UploadError::per_record(
                            sample_id,
                            format!("photo {} not confirmed: {}", photo.file_name(), exhausted),
                        ),
                    });
                }
            }

            // Photos from a run whose state was lost already fill the remainder
            if remote_count >= local_count {
                break;
            }
        }

        if remote_count >= local_count {
            self.mark_complete(sample_id, &photos).at(Stage::Complete)?;
            Ok(Outcome::Completed {
                remote_id,
                attached,
            })
        } else {
            Ok(Outcome::Incomplete {
                remote_id,
                remote_photos: remote_count,
                local_photos: local_count,
            })
        }
    }

    /// Record every local key and set the completion flag in one save.
    fn mark_complete(&mut self, sample_id: &str, photos: &[&LocalPhoto]) -> Result<()> {
        self.store.update(sample_id, |state| {
            for photo in photos {
                state.record_photo(photo.key.as_str());
            }
            state.complete = true;
        })
    }

    fn verify(&self, sample_id: &str, remote_id: u64) {
        match self.service.fetch(remote_id) {
            Ok(obs) => tracing::info!(
                %sample_id,
                remote_id,
                captive = ?obs.captive,
                photos = obs.photo_count(),
                "Verified observation"
            ),
            Err(e) => tracing::warn!(%sample_id, remote_id, error = %e, "Verify failed"),
        }
    }
}

fn log_outcome(sample_id: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Completed { remote_id, attached } => {
            tracing::info!(%sample_id, remote_id, attached, "Sample complete")
        }
        Outcome::AlreadyComplete => tracing::debug!(%sample_id, "Already complete, skipped"),
        Outcome::DryRun => {}
        Outcome::Skipped(SkipReason::NoPhotos) => {}
        Outcome::Skipped(SkipReason::NotFlagged) => {}
        Outcome::Skipped(SkipReason::Malformed(e)) | Outcome::Skipped(SkipReason::Unresolvable(e)) => {
            tracing::warn!(%sample_id, error = %e, "Skipped")
        }
        Outcome::Incomplete {
            remote_id,
            remote_photos,
            local_photos,
        } => tracing::warn!(
            %sample_id,
            remote_id,
            remote_photos,
            local_photos,
            "Remote has fewer photos than recorded; left incomplete"
        ),
        Outcome::Failed { stage, error } => {
            tracing::error!(%sample_id, %stage, error = %error, "Sample failed, state kept for a re-run")
        }
    }
}
