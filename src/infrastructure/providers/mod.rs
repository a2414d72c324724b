//! Concrete `ModelProvider` implementations (spec §4.12, §6).

pub mod claude;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::ports::model_provider::{ModelProvider, ProviderFactory};
use claude::{ClaudeProvider, ClaudeProviderConfig};

/// Maps an agent's optional capability profile name to a model identifier,
/// resolving each to its own [`ClaudeProvider`] instance on first use.
///
/// Grounded on `spec.md` §6's `ProviderFactory.GetProvider(profileName)`;
/// profiles beyond `None` are an ambient convenience for callers who want
/// e.g. a faster/cheaper model for triage agents without hand-wiring one
/// `ModelProvider` per agent.
pub struct ClaudeProviderFactory {
    default_provider: Arc<dyn ModelProvider>,
    profiles: HashMap<String, Arc<dyn ModelProvider>>,
}

impl ClaudeProviderFactory {
    pub fn new(default_config: ClaudeProviderConfig) -> Result<Self, crate::domain::error::VigilError> {
        let default_provider: Arc<dyn ModelProvider> = Arc::new(ClaudeProvider::new(default_config)?);
        Ok(Self { default_provider, profiles: HashMap::new() })
    }

    pub fn with_profile(mut self, name: impl Into<String>, config: ClaudeProviderConfig) -> Result<Self, crate::domain::error::VigilError> {
        let provider: Arc<dyn ModelProvider> = Arc::new(ClaudeProvider::new(config)?);
        self.profiles.insert(name.into(), provider);
        Ok(self)
    }
}

impl ProviderFactory for ClaudeProviderFactory {
    fn get_provider(&self, profile_name: Option<&str>) -> Arc<dyn ModelProvider> {
        match profile_name.and_then(|name| self.profiles.get(name)) {
            Some(provider) => provider.clone(),
            None => self.default_provider.clone(),
        }
    }
}
