//! Translation lookup for `[ key ]` macros in localized markup.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Source of translated strings, keyed by (key, language).
pub trait TranslationStore {
    fn lookup(&self, key: &str, language: &str) -> Option<String>;
}

/// Translations read from `<dir>/<lang>.json`, one flat string map per
/// language. Files are read on first use of a language.
#[derive(Debug, Default)]
pub struct JsonTranslations {
    dir: Option<PathBuf>,
    tables: RefCell<HashMap<String, HashMap<String, String>>>,
}

impl JsonTranslations {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: Some(dir.to_path_buf()),
            tables: Default::default(),
        }
    }

    /// A store without any translations.
    pub fn none() -> Self {
        Self::default()
    }

    fn load_table(&self, language: &str) -> HashMap<String, String> {
        let Some(dir) = &self.dir else {
            return HashMap::new();
        };
        let path = dir.join(format!("{language}.json"));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("no translations for `{language}` ({}: {e})", path.display());
                return HashMap::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("ignoring invalid translations {}: {e}", path.display());
                HashMap::new()
            }
        }
    }
}

impl TranslationStore for JsonTranslations {
    fn lookup(&self, key: &str, language: &str) -> Option<String> {
        let mut tables = self.tables.borrow_mut();
        let table = tables
            .entry(language.to_string())
            .or_insert_with(|| self.load_table(language));
        table.get(key).cloned()
    }
}

/// Text for `[ key ]`: the translation, or the key itself on a miss.
pub fn translate(store: &dyn TranslationStore, key: &str, language: Option<&str>) -> String {
    let Some(language) = language else {
        log::debug!("translation `{key}` outside localized markup");
        return key.to_string();
    };
    match store.lookup(key, language) {
        Some(text) => text,
        None => {
            log::warn!("missing `{language}` translation for `{key}`");
            key.to_string()
        }
    }
}
