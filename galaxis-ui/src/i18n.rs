//! Localization.
//!
//! One process-wide dictionary maps `dotted.key` names to strings for the
//! active language. Static widgets poll the version counter and refresh on
//! mismatch; content that cannot poll (log panels, generated text)
//! registers a named callback fired on every language change. Both
//! mechanisms exist because neither alone covers all consumers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::warn;
use once_cell::sync::Lazy;
use serde_json::Value;

/// Languages the engine ships translations for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Chinese,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Chinese => "zh",
        }
    }
}

/// Keys must carry this prefix to be treated as translatable; anything else
/// passes through [`LocalizationManager::get`] verbatim.
const I18N_KEY_PREFIX: &str = "i18ntext.";

fn is_i18n_key(key: &str) -> bool {
    key.contains('.') && key.starts_with(I18N_KEY_PREFIX)
}

/// Flattens a translation document into `dotted.key → string` for one
/// language.
///
/// Two shapes are accepted: a flat per-language file whose leaves are
/// strings, and a combined file whose leaves are `{lang_code: string}`
/// objects. An object containing `lang_code` is a translation leaf; any
/// other object is structure to recurse into.
pub fn parse_translations(
    value: &Value,
    parent_key: &str,
    lang_code: &str,
    dictionary: &mut HashMap<String, String>,
) {
    let Value::Object(map) = value else { return };
    for (key, child) in map {
        let full_key = if parent_key.is_empty() {
            key.clone()
        } else {
            format!("{parent_key}.{key}")
        };
        match child {
            Value::Object(leaf) if leaf.contains_key(lang_code) => {
                if let Some(Value::String(translated)) = leaf.get(lang_code) {
                    dictionary.insert(full_key, translated.clone());
                }
            }
            Value::Object(_) => parse_translations(child, &full_key, lang_code, dictionary),
            // Flat per-language file: leaves are plain strings.
            Value::String(translated) => {
                dictionary.insert(full_key, translated.clone());
            }
            _ => {}
        }
    }
}

type ChangeCallback = Box<dyn Fn() + Send + Sync>;

/// The process-wide translation table.
pub struct LocalizationManager {
    language: Language,
    dictionary: HashMap<String, String>,
    version: u64,
    translations_path: Option<PathBuf>,
    callbacks: Vec<(String, ChangeCallback)>,
}

impl Default for LocalizationManager {
    fn default() -> Self {
        LocalizationManager {
            language: Language::English,
            dictionary: HashMap::new(),
            version: 1,
            translations_path: None,
            callbacks: Vec::new(),
        }
    }
}

impl LocalizationManager {
    /// Points the manager at the combined translations file and loads the
    /// current language from it.
    pub fn set_translations_path(&mut self, path: impl Into<PathBuf>) {
        self.translations_path = Some(path.into());
        self.reload();
    }

    /// Switches language. A no-op when the language is already active and
    /// loaded; otherwise the dictionary reloads, the version counter bumps
    /// and every registered callback fires.
    pub fn set_language(&mut self, language: Language) {
        if self.language == language && !self.dictionary.is_empty() {
            return;
        }
        self.language = language;
        self.reload();
        self.version += 1;
        for (_, callback) in &self.callbacks {
            callback();
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Monotonic counter; widgets cache it and refresh on mismatch.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Translates `key`. Non-translatable keys pass through; missing
    /// translations render as `!key!` so they are visible in the UI.
    pub fn get(&self, key: &str) -> String {
        if !is_i18n_key(key) {
            return key.to_string();
        }
        match self.dictionary.get(key) {
            Some(translated) => translated.clone(),
            None => format!("!{key}!"),
        }
    }

    /// Loads translations from a JSON string (either accepted shape).
    pub fn load_from_str(&mut self, json: &str) -> bool {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => {
                self.dictionary.clear();
                parse_translations(&value, "", self.language.code(), &mut self.dictionary);
                true
            }
            Err(e) => {
                warn!("Failed to parse translations: {}", e);
                self.dictionary
                    .insert("error.parsing".to_string(), format!("JSON parse error: {e}"));
                false
            }
        }
    }

    fn reload(&mut self) {
        let Some(path) = self.translations_path.clone() else {
            return;
        };
        self.load_from_file(&path);
    }

    fn load_from_file(&mut self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                self.load_from_str(&raw);
            }
            Err(e) => {
                warn!("Failed to load translations from {}: {}", path.display(), e);
                self.dictionary.clear();
                self.dictionary.insert(
                    "error.loading".to_string(),
                    format!("Failed to load {}", path.display()),
                );
            }
        }
    }

    /// Registers a named change callback. Re-registering a name replaces
    /// the previous callback.
    pub fn register_callback(&mut self, name: impl Into<String>, callback: ChangeCallback) {
        let name = name.into();
        self.callbacks.retain(|(n, _)| *n != name);
        self.callbacks.push((name, callback));
    }

    pub fn unregister_callback(&mut self, name: &str) {
        self.callbacks.retain(|(n, _)| n != name);
    }
}

/// The process-wide localization table.
pub static LOCALIZATION: Lazy<RwLock<LocalizationManager>> =
    Lazy::new(|| RwLock::new(LocalizationManager::default()));

/// Convenience: translate through the global manager.
pub fn localize(key: &str) -> String {
    LOCALIZATION.read().expect("localization lock poisoned").get(key)
}

/// Convenience: the global version counter.
pub fn localization_version() -> u64 {
    LOCALIZATION.read().expect("localization lock poisoned").version()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const COMBINED: &str = r#"{
        "i18ntext": {
            "ui": {
                "close_panel": { "en": "Close", "zh": "关闭" },
                "time": {
                    "paused": { "en": "Paused", "zh": "已暂停" }
                }
            }
        }
    }"#;

    const FLAT: &str = r#"{
        "i18ntext": {
            "ui": { "close_panel": "Close" }
        }
    }"#;

    #[test]
    fn combined_file_flattens_to_dotted_keys() {
        let value: Value = serde_json::from_str(COMBINED).unwrap();
        let mut dict = HashMap::new();
        parse_translations(&value, "", "zh", &mut dict);
        assert_eq!(dict.get("i18ntext.ui.close_panel").unwrap(), "关闭");
        assert_eq!(dict.get("i18ntext.ui.time.paused").unwrap(), "已暂停");
    }

    #[test]
    fn flat_file_parses_string_leaves() {
        let value: Value = serde_json::from_str(FLAT).unwrap();
        let mut dict = HashMap::new();
        parse_translations(&value, "", "en", &mut dict);
        assert_eq!(dict.get("i18ntext.ui.close_panel").unwrap(), "Close");
    }

    #[test]
    fn non_i18n_keys_pass_through() {
        let manager = LocalizationManager::default();
        assert_eq!(manager.get("Plain label"), "Plain label");
        assert_eq!(manager.get("no_dot_prefix"), "no_dot_prefix");
    }

    #[test]
    fn missing_keys_are_marked() {
        let manager = LocalizationManager::default();
        assert_eq!(manager.get("i18ntext.missing.key"), "!i18ntext.missing.key!");
    }

    #[test]
    fn language_change_bumps_version_and_fires_callbacks() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut manager = LocalizationManager::default();
        manager.load_from_str(COMBINED);
        let version = manager.version();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        manager.register_callback("log-panel", Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        manager.set_language(Language::Chinese);
        assert_eq!(manager.version(), version + 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Same language again: no reload, no version bump, no callback.
        manager.set_language(Language::Chinese);
        assert_eq!(manager.version(), version + 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_registration_replaces_by_name() {
        let mut manager = LocalizationManager::default();
        manager.register_callback("a", Box::new(|| {}));
        manager.register_callback("a", Box::new(|| {}));
        assert_eq!(manager.callbacks.len(), 1);
        manager.unregister_callback("a");
        assert!(manager.callbacks.is_empty());
    }
}
