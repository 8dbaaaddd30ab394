//! Test-only helpers: asset builders, an in-memory server and scripted answers.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::core::types::{Asset, LedgerRecord, MediaKind, Outcome};
use crate::io::api::{ApiError, AssetApi, AssetPage, AssetQuery, check_current_link};
use crate::io::config::Settings;
use crate::io::confirm::Confirm;
use crate::io::ledger::LedgerWriter;

/// Parse an RFC 3339 timestamp into UTC.
pub fn at(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .expect("valid rfc3339 timestamp")
        .with_timezone(&Utc)
}

fn asset(id: &str, name: &str, kind: MediaKind, created: &str) -> Asset {
    Asset {
        id: id.to_string(),
        original_file_name: name.to_string(),
        kind,
        file_created_at: at(created),
        live_photo_video_id: None,
    }
}

/// Unlinked still image.
pub fn photo(id: &str, name: &str, created: &str) -> Asset {
    asset(id, name, MediaKind::Image, created)
}

/// Still image already linked to `video_id`.
pub fn linked_photo(id: &str, name: &str, created: &str, video_id: &str) -> Asset {
    Asset {
        live_photo_video_id: Some(video_id.to_string()),
        ..photo(id, name, created)
    }
}

pub fn video(id: &str, name: &str, created: &str) -> Asset {
    asset(id, name, MediaKind::Video, created)
}

/// Ledger row with derived filenames and a fixed timestamp.
pub fn record(photo_id: &str, video_id: &str, outcome: Outcome) -> LedgerRecord {
    LedgerRecord {
        photo_asset_id: photo_id.to_string(),
        video_asset_id: video_id.to_string(),
        photo_filename: format!("{photo_id}.heic"),
        video_filename: format!("{video_id}.mov"),
        operated_at: at("2024-01-31T23:59:59Z"),
        outcome,
        error: None,
    }
}

/// Mutation observed by [`FakeApi`], recorded for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Link { photo: String, video: String },
    Unlink { photo: String },
}

/// In-memory [`AssetApi`] with server-like link semantics.
///
/// Listing pages are cut from the asset vector in insertion order. Failures
/// can be scripted for the connection check, the next page request, or the
/// next mutations touching a given photo.
pub struct FakeApi {
    assets: RefCell<Vec<Asset>>,
    page_size: usize,
    page_requests: Cell<usize>,
    mutations: RefCell<Vec<Mutation>>,
    connection_error: RefCell<Option<ApiError>>,
    page_errors: RefCell<VecDeque<ApiError>>,
    mutation_errors: RefCell<HashMap<String, VecDeque<ApiError>>>,
}

impl FakeApi {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self {
            assets: RefCell::new(assets),
            page_size: 100,
            page_requests: Cell::new(0),
            mutations: RefCell::new(Vec::new()),
            connection_error: RefCell::new(None),
            page_errors: RefCell::new(VecDeque::new()),
            mutation_errors: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn fail_connection(&self, err: ApiError) {
        *self.connection_error.borrow_mut() = Some(err);
    }

    pub fn fail_next_page(&self, err: ApiError) {
        self.page_errors.borrow_mut().push_back(err);
    }

    /// Queue `err` for the next mutation on `photo_id`.
    pub fn fail_mutation(&self, photo_id: &str, err: ApiError) {
        self.mutation_errors
            .borrow_mut()
            .entry(photo_id.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.get()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.borrow().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.borrow().len()
    }

    pub fn live_video_of(&self, photo_id: &str) -> Option<String> {
        self.assets
            .borrow()
            .iter()
            .find(|asset| asset.id == photo_id)
            .and_then(|asset| asset.live_photo_video_id.clone())
    }

    pub fn snapshot(&self) -> Vec<Asset> {
        self.assets.borrow().clone()
    }

    fn scripted_error(&self, photo_id: &str) -> Option<ApiError> {
        self.mutation_errors
            .borrow_mut()
            .get_mut(photo_id)
            .and_then(VecDeque::pop_front)
    }

    fn exists(&self, id: &str) -> bool {
        self.assets.borrow().iter().any(|asset| asset.id == id)
    }
}

impl AssetApi for FakeApi {
    fn check_connection(&self) -> Result<(), ApiError> {
        match self.connection_error.borrow().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fetch_page(&self, query: &AssetQuery, page: u32) -> Result<AssetPage, ApiError> {
        self.page_requests.set(self.page_requests.get() + 1);
        if let Some(err) = self.page_errors.borrow_mut().pop_front() {
            return Err(err);
        }
        let matching: Vec<Asset> = self
            .assets
            .borrow()
            .iter()
            .filter(|asset| asset.kind == query.kind)
            .cloned()
            .collect();
        let start = (page.max(1) as usize - 1) * self.page_size;
        let items: Vec<Asset> = matching
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        let next_page = (start + self.page_size < matching.len()).then_some(page + 1);
        Ok(AssetPage { items, next_page })
    }

    fn get_asset(&self, id: &str) -> Result<Asset, ApiError> {
        self.assets
            .borrow()
            .iter()
            .find(|asset| asset.id == id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("asset {id}")))
    }

    fn link(&self, photo_id: &str, video_id: &str) -> Result<(), ApiError> {
        self.mutations.borrow_mut().push(Mutation::Link {
            photo: photo_id.to_string(),
            video: video_id.to_string(),
        });
        if let Some(err) = self.scripted_error(photo_id) {
            return Err(err);
        }
        if !self.exists(video_id) {
            return Err(ApiError::NotFound(format!("asset {video_id}")));
        }
        let mut assets = self.assets.borrow_mut();
        let photo = assets
            .iter_mut()
            .find(|asset| asset.id == photo_id)
            .ok_or_else(|| ApiError::NotFound(format!("asset {photo_id}")))?;
        match photo.live_photo_video_id.as_deref() {
            Some(existing) if existing != video_id => Err(ApiError::Conflict {
                status: 400,
                message: format!("asset {photo_id} already linked to {existing}"),
            }),
            _ => {
                photo.live_photo_video_id = Some(video_id.to_string());
                Ok(())
            }
        }
    }

    fn unlink(&self, photo_id: &str, video_id: &str) -> Result<(), ApiError> {
        self.mutations.borrow_mut().push(Mutation::Unlink {
            photo: photo_id.to_string(),
        });
        if let Some(err) = self.scripted_error(photo_id) {
            return Err(err);
        }
        let mut assets = self.assets.borrow_mut();
        let photo = assets
            .iter_mut()
            .find(|asset| asset.id == photo_id)
            .ok_or_else(|| ApiError::NotFound(format!("asset {photo_id}")))?;
        check_current_link(photo, video_id)?;
        photo.live_photo_video_id = None;
        Ok(())
    }
}

/// Confirmation stub answering from a fixed script.
///
/// Running out of answers is an error so tests notice unexpected prompts.
pub struct ScriptedConfirm {
    answers: VecDeque<bool>,
    prompts: Vec<String>,
}

impl ScriptedConfirm {
    pub fn new<I: IntoIterator<Item = bool>>(answers: I) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    /// Fails on any prompt.
    pub fn unprompted() -> Self {
        Self::new(Vec::<bool>::new())
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self.prompts.push(prompt.to_string());
        match self.answers.pop_front() {
            Some(answer) => Ok(answer),
            None => bail!("unexpected prompt: {prompt}"),
        }
    }
}

/// Scratch directory plus settings pointing their output into it.
pub struct TestWorkspace {
    dir: TempDir,
    settings: Settings,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings {
            api_url: "http://immich.test".to_string(),
            api_key: "test-key".to_string(),
            output_dir: dir.path().join("output"),
            match_tolerance: Duration::from_secs(3),
            page_size: 100,
            request_timeout: Duration::from_secs(5),
            retry_backoff: Duration::ZERO,
        };
        Self { dir, settings }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Write `rows` as a ledger file inside the workspace.
    pub fn write_ledger(&self, rows: &[LedgerRecord]) -> PathBuf {
        let path = self.dir.path().join("input_ledger.csv");
        let mut writer = LedgerWriter::create(&path).expect("create ledger");
        for row in rows {
            writer.append(row).expect("append row");
        }
        path
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
