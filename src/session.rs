use std::{collections::{BTreeSet, HashMap}, sync::Arc, time::Duration};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::tagger::{TagError, TaggedImage};

/// One interactive session. Only the language toggle, the uploaded images and
/// the confirmed tags outlive a single request; nothing here is persisted.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    show_in_georgian: bool,
    images: Vec<TaggedImage>,
    confirmed_tags: Vec<String>,
    busy: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub show_in_georgian: bool,
    pub images: Vec<TaggedImage>,
    pub confirmed_tags: Vec<String>,
    pub busy: Vec<String>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_seen: now,
            show_in_georgian: true,
            images: Vec::new(),
            confirmed_tags: Vec::new(),
            busy: BTreeSet::new(),
        }
    }

    pub fn show_in_georgian(&self) -> bool { self.show_in_georgian }

    pub fn set_show_in_georgian(&mut self, value: bool) { self.show_in_georgian = value; }

    pub fn images(&self) -> &[TaggedImage] { &self.images }

    pub fn confirmed_tags(&self) -> &[String] { &self.confirmed_tags }

    /// Adds an uploaded image, giving it a key no other image in this session has.
    pub fn add_image(&mut self, mut image: TaggedImage) -> &TaggedImage {
        image.key = self.unique_key(&image.key);
        self.images.push(image);
        &self.images[self.images.len() - 1]
    }

    pub fn edit_tag(&mut self, key: &str, tag: &str) -> Result<&TaggedImage, TagError> {
        let image = self.image_mut(key)?;
        image.tag = tag.trim().to_string();
        Ok(&*image)
    }

    /// The "add to wardrobe" action for one image: appends its current tag
    /// (or the override, which also becomes the current tag) exactly once.
    pub fn confirm_tag(&mut self, key: &str, override_tag: Option<&str>) -> Result<String, TagError> {
        let image = self.image_mut(key)?;
        let tag = match override_tag {
            Some(tag) => tag.trim().to_string(),
            None => image.tag.clone(),
        };
        if tag.is_empty() {
            return Err(TagError::BlankTag(key.to_string()));
        }
        image.tag = tag.clone();
        image.confirmations += 1;
        self.confirmed_tags.push(tag.clone());
        Ok(tag)
    }

    pub(crate) fn mark_busy(&mut self, element: &str) { self.busy.insert(element.to_string()); }

    pub(crate) fn clear_busy(&mut self, element: &str) { self.busy.remove(element); }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            created_at: self.created_at,
            show_in_georgian: self.show_in_georgian,
            images: self.images().to_vec(),
            confirmed_tags: self.confirmed_tags.clone(),
            busy: self.busy.iter().cloned().collect(),
        }
    }

    fn image_mut(&mut self, key: &str) -> Result<&mut TaggedImage, TagError> {
        self.images.iter_mut().find(|i| i.key == key).ok_or_else(|| TagError::UnknownImage(key.to_string()))
    }

    /// A key for an image that is about to be tagged: unused by stored images
    /// and by uploads still in flight.
    pub fn unique_image_key(&self, base: &str) -> String {
        let taken = |k: &str| self.images.iter().any(|i| i.key == k) || self.busy.contains(&image_element(k));
        if !taken(base) { return base.to_string(); }
        (2..).map(|n| format!("{base}-{n}")).find(|k| !taken(k)).unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Picks a key for an incoming image and marks it busy in one step.
    pub(crate) fn reserve_image_key(&mut self, base: &str) -> String {
        let key = self.unique_image_key(base);
        self.mark_busy(&image_element(&key));
        key
    }

    fn is_idle_for(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        // A negative age (clock moved back) counts as fresh.
        (now - self.last_seen).to_std().is_ok_and(|age| age >= ttl)
    }

    fn unique_key(&self, base: &str) -> String {
        let taken = |k: &str| self.images.iter().any(|i| i.key == k);
        if !taken(base) { return base.to_string(); }
        (2..).map(|n| format!("{base}-{n}")).find(|k| !taken(k)).unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

/// Busy-set name of the image card with this key.
pub fn image_element(key: &str) -> String { format!("image:{key}") }

impl Default for Session {
    fn default() -> Self { Self::new() }
}

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// In-memory sessions. Sessions untouched for longer than the TTL are dropped
/// the next time a session is created.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self { Self::with_ttl(DEFAULT_SESSION_TTL) }
}

impl SessionStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { inner: Arc::default(), ttl }
    }

    pub fn create(&self) -> Session {
        let session = Session::new();
        let mut sessions = self.inner.write();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_idle_for(self.ttl, session.created_at));
        if sessions.len() < before {
            tracing::info!("🧹 Dropped {} idle sessions", before - sessions.len());
        }
        sessions.insert(session.id, session.clone());
        tracing::info!(session = %session.id, "Session started");
        session
    }

    pub fn view(&self, id: Uuid) -> Option<SessionView> {
        self.update(id, |s| s.view())
    }

    pub fn contains(&self, id: Uuid) -> bool { self.inner.read().contains_key(&id) }

    /// Runs `f` against the session under the write lock and marks it as seen.
    /// Never hold this across an await.
    pub fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.inner.write().get_mut(&id).map(|s| {
            s.last_seen = Utc::now();
            f(s)
        })
    }
}
