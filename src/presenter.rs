use serde::Serialize;
use uuid::Uuid;

use crate::{
    openai::GenerationError,
    session::SessionStore,
    stylist::{Language, Reply},
};

pub const OUTFIT_ELEMENT: &str = "outfit";

/// What the page shows for one "Get My Outfit" press: either the suggestion or a
/// single error banner, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Presentation {
    Suggestion { heading: String, markdown: String, language: Language },
    Error { message: String },
}

impl Presentation {
    pub fn is_error(&self) -> bool { matches!(self, Presentation::Error { .. }) }
}

pub fn heading_for(language: Language) -> &'static str {
    match language {
        Language::English => "🪄 AI Stylist Suggestion",
        Language::Georgian => "🪄 სტილისტის რჩევა ქართულად",
    }
}

pub fn present(result: Result<Reply, GenerationError>) -> Presentation {
    match result {
        Ok(reply) => Presentation::Suggestion {
            heading: heading_for(reply.language).to_string(),
            markdown: reply.text,
            language: reply.language,
        },
        Err(e) => Presentation::Error { message: format!("❌ Error from the stylist model: {e}") },
    }
}

/// Marks one page element busy for as long as it lives.
pub struct BusyGuard {
    store: SessionStore,
    session: Uuid,
    element: String,
}

impl BusyGuard {
    pub fn begin(store: &SessionStore, session: Uuid, element: impl Into<String>) -> Self {
        let element = element.into();
        store.update(session, |s| s.mark_busy(&element));
        Self { store: store.clone(), session, element }
    }

    /// Takes over an element that was already marked busy under the session lock.
    pub fn claimed(store: &SessionStore, session: Uuid, element: String) -> Self {
        Self { store: store.clone(), session, element }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.store.update(self.session, |s| s.clear_busy(&self.element));
    }
}
