use log::info;
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::llm::chat::PromptMessage;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an AI assistant that uses website data to enhance responses.";
pub const DEFAULT_ENRICHMENT_TEMPLATE: &str = "Website data: {website_data}\n\nUser query: {message}";

#[derive(Debug)]
pub enum PromptError {
    MissingPlaceholder(&'static str),
    PlaceholderOrder,
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::MissingPlaceholder(key) => {
                write!(f, "Enrichment template is missing the '{}' placeholder", key)
            }
            PromptError::PlaceholderOrder => {
                write!(f, "Enrichment template must place {{website_data}} before {{message}}")
            }
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_system")]
    pub system: String,
    /// Wraps crawled markdown and the user's message; `{website_data}` must come
    /// before `{message}`.
    #[serde(default = "default_enrichment_template")]
    pub enrichment_template: String,
}

fn default_system() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_enrichment_template() -> String {
    DEFAULT_ENRICHMENT_TEMPLATE.to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: default_system(),
            enrichment_template: default_enrichment_template(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        let data_at = self.enrichment_template
            .find("{website_data}")
            .ok_or(PromptError::MissingPlaceholder("{website_data}"))?;
        let message_at = self.enrichment_template
            .find("{message}")
            .ok_or(PromptError::MissingPlaceholder("{message}"))?;
        if message_at < data_at {
            return Err(PromptError::PlaceholderOrder);
        }
        Ok(())
    }

    /// System instruction plus the user turn, with crawled markdown ahead of the
    /// user's message when there is any.
    pub fn build_messages(&self, message: &str, website_data: Option<&str>) -> Vec<PromptMessage> {
        let user_content = match website_data {
            Some(data) => {
                let (head, tail) = self.enrichment_template
                    .split_once("{website_data}")
                    .unwrap_or(("", self.enrichment_template.as_str()));
                format!("{}{}{}", head, data, tail.replacen("{message}", message, 1))
            }
            None => message.to_string(),
        };
        vec![PromptMessage::system(self.system.clone()), PromptMessage::user(user_content)]
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<PromptConfig, PromptError> {
    let config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

pub fn load_prompts<P: AsRef<Path>>(path: Option<P>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            let config = load_prompts_from_str(&content)?;
            info!("Loaded prompts from {}", path.as_ref().display());
            Ok(Arc::new(config))
        }
        None => Ok(Arc::new(PromptConfig::default())),
    }
}
