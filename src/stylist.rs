use std::sync::Arc;
use serde::Serialize;
use tracing::{info, error};

use crate::{
    localizer::Localizer,
    models::{Context, UserProfile},
    openai::{ChatRequest, GenerationError, TextGenerator},
    prompt::{compose_prompt, STYLIST_SYSTEM_INSTRUCTION},
    wardrobe::WardrobeItem,
};

pub const STYLIST_TEMPERATURE: f32 = 0.9;
pub const STYLIST_MAX_TOKENS: u32 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language { English, Georgian }

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub text: String,
    pub language: Language,
}

/// Sends one composed prompt to the model and, when asked and available,
/// passes the answer through the localizer.
pub struct Stylist {
    generator: Arc<dyn TextGenerator>,
    localizer: Option<Localizer>,
}

impl Stylist {
    pub fn new(generator: Arc<dyn TextGenerator>, localizer: Option<Localizer>) -> Self {
        Self { generator, localizer }
    }

    pub fn localizes(&self) -> bool { self.localizer.is_some() }

    pub async fn request(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            system: STYLIST_SYSTEM_INSTRUCTION.to_string(),
            user: prompt.to_string(),
            temperature: STYLIST_TEMPERATURE,
            max_tokens: STYLIST_MAX_TOKENS,
        };
        let reply = self.generator.generate(&request).await?;
        Ok(reply.trim().to_string())
    }

    pub async fn suggest(
        &self,
        profile: &UserProfile,
        wardrobe: &[WardrobeItem],
        context: &Context,
    ) -> Result<Reply, GenerationError> {
        if wardrobe.is_empty() {
            info!("🧺 Wardrobe is empty, prompt will ask for an outfit from basics");
        }
        let prompt = compose_prompt(profile, wardrobe, context);
        info!("🎯 Requesting outfit for '{}' ({} wardrobe items)", context.event, wardrobe.len());

        let reply = self.request(&prompt).await.inspect_err(|e| error!("❌ Outfit generation failed: {}", e))?;
        info!("✅ Stylist reply received ({} chars)", reply.len());

        match (&self.localizer, context.show_in_georgian) {
            (Some(localizer), true) => {
                let text = localizer.localize(&reply).await.inspect_err(|e| error!("❌ Localization failed: {}", e))?;
                Ok(Reply { text, language: Language::Georgian })
            }
            _ => Ok(Reply { text: reply, language: Language::English }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Season;
    use crate::wardrobe::parse_wardrobe;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Replays canned results in order and records every request it sees.
    pub(crate) struct ScriptedGenerator {
        script: Mutex<Vec<Result<String, GenerationError>>>,
        calls: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedGenerator {
        pub(crate) fn new(mut script: Vec<Result<String, GenerationError>>) -> Self {
            script.reverse();
            Self { script: Mutex::new(script), calls: Mutex::new(Vec::new()) }
        }

        pub(crate) fn calls(&self) -> Vec<ChatRequest> { self.calls.lock().clone() }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: &ChatRequest) -> Result<String, GenerationError> {
            self.calls.lock().push(request.clone());
            self.script.lock().pop().unwrap_or_else(|| Err(GenerationError::Network("script exhausted".into())))
        }
    }

    fn context(show_in_georgian: bool) -> Context {
        Context {
            event: "coffee date".into(),
            season: Season::Spring,
            temperature_c: 20,
            rain_expected: false,
            shopping_enabled: true,
            show_in_georgian,
        }
    }

    fn stylist(generator: &Arc<ScriptedGenerator>, localize: bool) -> Stylist {
        let localizer = localize.then(|| Localizer::new(generator.clone()));
        Stylist::new(generator.clone(), localizer)
    }

    #[tokio::test]
    async fn request_uses_stylist_sampling_and_trims() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("\n  Wear the blazer.  ".into())]));
        let reply = stylist(&generator, false).request("prompt").await.unwrap();
        assert_eq!(reply, "Wear the blazer.");

        let calls = generator.calls();
        assert_eq!(calls[0].system, STYLIST_SYSTEM_INSTRUCTION);
        assert_eq!(calls[0].temperature, 0.9);
        assert_eq!(calls[0].max_tokens, 800);
    }

    #[tokio::test]
    async fn georgian_flag_runs_the_localizer_once() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("Wear the blazer.".into()), Ok("ჩაიცვით ბლეიზერი.".into())]));
        let reply = stylist(&generator, true)
            .suggest(&UserProfile::default(), &parse_wardrobe("white blouse"), &context(true))
            .await
            .unwrap();

        assert_eq!(reply, Reply { text: "ჩაიცვით ბლეიზერი.".into(), language: Language::Georgian });
        let calls = generator.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].user, "Wear the blazer.");
        assert_eq!(calls[1].temperature, 0.7);
    }

    #[tokio::test]
    async fn english_passes_through_unchanged() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("Wear the blazer.".into())]));
        let reply = stylist(&generator, true)
            .suggest(&UserProfile::default(), &parse_wardrobe("white blouse"), &context(false))
            .await
            .unwrap();
        assert_eq!(reply, Reply { text: "Wear the blazer.".into(), language: Language::English });
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn without_a_localizer_the_flag_is_ignored() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("Wear the blazer.".into())]));
        let reply = stylist(&generator, false)
            .suggest(&UserProfile::default(), &[], &context(true))
            .await
            .unwrap();
        assert_eq!(reply.language, Language::English);
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_request_skips_localization() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(GenerationError::Timeout("operation timed out".into()))]));
        let err = stylist(&generator, true)
            .suggest(&UserProfile::default(), &[], &context(true))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Timeout("operation timed out".into()));
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_translation_drops_the_english_reply() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("Wear the blazer.".into()),
            Err(GenerationError::RateLimited("slow down".into())),
        ]));
        let err = stylist(&generator, true)
            .suggest(&UserProfile::default(), &[], &context(true))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::RateLimited("slow down".into()));
        let calls = generator.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].user, "Wear the blazer.");
    }
}
