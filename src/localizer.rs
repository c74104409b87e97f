use std::sync::Arc;
use tracing::info;

use crate::openai::{ChatRequest, GenerationError, TextGenerator};

pub const LOCALIZATION_TEMPERATURE: f32 = 0.7;
pub const LOCALIZATION_MAX_TOKENS: u32 = 700;

/// Hand-written English → Georgian stylist phrasings used as few-shot exemplars.
pub const GEORGIAN_EXEMPLARS: &[(&str, &str)] = &[
    (
        "Try this blazer with cropped trousers and sneakers for a laid-back brunch.",
        "ამ შტრიხებით თქვენს ბრანჩის სტილს მეტი სინატიფე და სიმარტივე დაემატება — შერჩიეთ ბრეზერი და მოკლე შარვლები კომფორტული კედებით.",
    ),
    (
        "Throw on a lightweight trench for those unpredictable spring evenings.",
        "გაზაფხულის მოულოდნელ სიცივეს დახვეწილად შეხვდით — მსუბუქი ტრენჩი იდეალური არჩევანია.",
    ),
    (
        "Opt for neutral tones and simple lines to create a minimalist chic look.",
        "ნეიტრალური ფერები და სუფთა ხაზები დაგეხმარებათ მინიმალისტურ, გემოვნებიან იმიჯში.",
    ),
];

pub fn localization_instruction() -> String {
    let examples: String = GEORGIAN_EXEMPLARS
        .iter()
        .map(|(en, ka)| format!("\nEN: “{en}”\nKA: “{ka}”\n"))
        .collect();
    format!(
        "You are a native Georgian fashion stylist translating for Georgian women. \
Adapt the text naturally for a native speaker, in natural Georgian and an elegant stylist voice. \
Here are some examples:\n{examples}"
    )
}

/// Rewrites an English stylist reply in Georgian with one extra generation call.
pub struct Localizer {
    generator: Arc<dyn TextGenerator>,
}

impl Localizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self { Self { generator } }

    pub async fn localize(&self, reply: &str) -> Result<String, GenerationError> {
        info!("🇬🇪 Localizing reply ({} chars)", reply.len());
        let request = ChatRequest {
            system: localization_instruction(),
            user: reply.to_string(),
            temperature: LOCALIZATION_TEMPERATURE,
            max_tokens: LOCALIZATION_MAX_TOKENS,
        };
        let localized = self.generator.generate(&request).await?;
        Ok(localized.trim().to_string())
    }
}
