//! Everything a build needs besides the asset tree itself.
//!
//! Built once per build from a [`BuildConfig`] and passed by reference to the
//! driver. Tests swap in their own collaborators through [`BuildContext::new`].

use crate::appconf::{AppConfig, AppConfigError};
use crate::config::BuildConfig;
use crate::i18n::{JsonTranslations, TranslationStore};
use crate::processor::{CommandProcessor, ExternalProcessor};

pub struct BuildContext {
    pub config: BuildConfig,
    pub translations: Box<dyn TranslationStore>,
    pub appconf: AppConfig,
    pub processor: Box<dyn ExternalProcessor>,
}

impl BuildContext {
    pub fn new(
        config: BuildConfig,
        translations: Box<dyn TranslationStore>,
        appconf: AppConfig,
        processor: Box<dyn ExternalProcessor>,
    ) -> Self {
        Self {
            config,
            translations,
            appconf,
            processor,
        }
    }

    /// Production collaborators: JSON translations and app config from the
    /// configured directories, processors from `[processors]`.
    pub fn load(config: BuildConfig) -> Result<Self, AppConfigError> {
        let appconf = match &config.appconf {
            Some(dir) => AppConfig::load(dir)?,
            None => AppConfig::empty(),
        };
        let translations = match &config.i18n {
            Some(dir) => JsonTranslations::new(dir),
            None => JsonTranslations::none(),
        };
        let processor = CommandProcessor::new(config.processors.clone());
        Ok(Self::new(
            config,
            Box::new(translations),
            appconf,
            Box::new(processor),
        ))
    }

    /// Replacement text for `[%= resource_url key %]`.
    pub fn resource_url(&self, key: &str) -> String {
        match self.config.resources.get(key) {
            Some(url) => url.clone(),
            None => {
                log::warn!("resource `{key}` is not defined");
                String::new()
            }
        }
    }
}
