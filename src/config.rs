use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    localizer::Localizer,
    openai::{Captioner, MockGenerator, OpenAiClient, TextGenerator},
    stylist::Stylist,
    session::DEFAULT_SESSION_TTL,
    tagger::ImageTagger,
};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: expected one of {expected}, got '{value}'")]
    Invalid { key: &'static str, expected: &'static str, value: String },
    #[error("STYLIST_GENERATION=live requires OPENAI_API_KEY")]
    MissingCredential,
    #[error("HTTP client: {0}")]
    Client(String),
}

/// Supplies the API credential. Kept behind a trait so the key can come from
/// somewhere other than the process environment.
pub trait CredentialSource: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn api_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode { Live, Mock }

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
    pub generation: GenerationMode,
    pub captioning: bool,
    pub localization: bool,
    pub session_ttl: Duration,
}

fn parse_switch(key: &'static str, value: Option<&String>) -> Result<bool, ConfigError> {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(true),
        Some(v) if matches!(v.as_str(), "on" | "true" | "1" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "off" | "false" | "0" | "no") => Ok(false),
        Some(v) => Err(ConfigError::Invalid { key, expected: "on|off", value: v }),
    }
}

impl AppConfig {
    pub fn from_env(credentials: &dyn CredentialSource) -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect(), credentials.api_key().is_some())
    }

    pub fn from_vars(vars: &HashMap<String, String>, has_credential: bool) -> Result<Self, ConfigError> {
        let generation = match vars.get("STYLIST_GENERATION").map(|v| v.trim().to_ascii_lowercase()) {
            None if has_credential => GenerationMode::Live,
            None => {
                warn!("OPENAI_API_KEY not set, running in demo mode");
                GenerationMode::Mock
            }
            Some(v) if v == "live" => {
                if !has_credential { return Err(ConfigError::MissingCredential); }
                GenerationMode::Live
            }
            Some(v) if v == "mock" => GenerationMode::Mock,
            Some(v) => return Err(ConfigError::Invalid { key: "STYLIST_GENERATION", expected: "live|mock", value: v }),
        };

        let captioning = parse_switch("STYLIST_CAPTIONING", vars.get("STYLIST_CAPTIONING"))?
            && generation == GenerationMode::Live;
        // The mock reply is English.
        let localization = parse_switch("STYLIST_LOCALIZATION", vars.get("STYLIST_LOCALIZATION"))?
            && generation == GenerationMode::Live;

        Ok(Self {
            port: vars.get("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            api_base: vars.get("OPENAI_API_BASE").cloned().unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: vars.get("OPENAI_MODEL").cloned().unwrap_or_else(|| "gpt-4o".to_string()),
            timeout: Duration::from_secs(vars.get("OPENAI_TIMEOUT_SECS").and_then(|v| v.parse().ok()).unwrap_or(60)),
            generation,
            captioning,
            localization,
            session_ttl: vars.get("SESSION_TTL_MINS").and_then(|v| v.parse().ok())
                .map_or(DEFAULT_SESSION_TTL, |mins: u64| Duration::from_secs(mins.saturating_mul(60))),
        })
    }

    /// Wires the capabilities this configuration selects.
    pub fn build(&self, credentials: &dyn CredentialSource) -> Result<(Stylist, ImageTagger), ConfigError> {
        let (generator, captioner): (Arc<dyn TextGenerator>, Option<Arc<dyn Captioner>>) = match self.generation {
            GenerationMode::Mock => (Arc::new(MockGenerator) as Arc<dyn TextGenerator>, None),
            GenerationMode::Live => {
                let api_key = credentials.api_key().ok_or(ConfigError::MissingCredential)?;
                info!("Using API key: {}...", api_key.chars().take(6).collect::<String>());
                let client = Arc::new(
                    OpenAiClient::new(api_key, self.api_base.clone(), self.model.clone(), self.timeout)
                        .map_err(|e| ConfigError::Client(e.to_string()))?,
                );
                let captioner = self.captioning.then(|| client.clone() as Arc<dyn Captioner>);
                (client as Arc<dyn TextGenerator>, captioner)
            }
        };

        let localizer = self.localization.then(|| Localizer::new(generator.clone()));
        Ok((Stylist::new(generator, localizer), ImageTagger::new(captioner)))
    }
}
