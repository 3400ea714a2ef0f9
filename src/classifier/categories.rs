use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{ClassifierError, Result};

pub const DEFAULT_EVENT_CONFIG_PATH: &str = "config/event_config.json";

/// One entry of the event configuration file, keyed by category name.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRecord {
    pub relevant: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A configured label and its static relevance policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDescriptor {
    pub name: String,
    pub is_relevant: bool,
    pub description: String,
    pub keywords: Vec<String>,
}

/// The immutable label set a classifier is built with.
///
/// Names are kept sorted; that order is what the response parser walks when
/// it falls back to substring matching.
#[derive(Debug, Clone)]
pub struct CategorySet {
    by_name: BTreeMap<String, CategoryDescriptor>,
}

impl CategorySet {
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, CategoryRecord)>,
    {
        let by_name: BTreeMap<String, CategoryDescriptor> = records
            .into_iter()
            .map(|(name, record)| {
                let descriptor = CategoryDescriptor {
                    name: name.clone(),
                    is_relevant: record.relevant,
                    description: record.description,
                    keywords: record.keywords,
                };
                (name, descriptor)
            })
            .collect();

        if by_name.is_empty() {
            return Err(ClassifierError::EmptyCategorySet);
        }
        Ok(CategorySet { by_name })
    }

    /// Parse the JSON form of the configuration (`name → record`).
    pub fn from_json(json: &str, origin: &Path) -> Result<Self> {
        let records: BTreeMap<String, CategoryRecord> =
            serde_json::from_str(json).map_err(|source| ClassifierError::InvalidConfiguration {
                path: origin.to_path_buf(),
                source,
            })?;
        Self::from_records(records)
    }

    /// Load the configuration file; a missing file is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClassifierError::ConfigurationNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        let set = Self::from_json(&json, path)?;
        info!("Loaded {} event categories from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&CategoryDescriptor> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.by_name.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryDescriptor> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"{
        "Test Event": {"relevant": true, "description": "Test event description", "keywords": ["test", "sample"]},
        "Irrelevant Event": {"relevant": false, "description": "Not important event", "keywords": ["irrelevant"]}
    }"#;

    #[test]
    fn from_json() {
        let set = CategorySet::from_json(SAMPLE, Path::new("inline")).unwrap();
        assert_eq!(set.len(), 2);
        let test = set.get("Test Event").unwrap();
        assert!(test.is_relevant);
        assert_eq!(test.description, "Test event description");
        assert_eq!(test.keywords, vec!["test", "sample"]);
        assert!(!set.get("Irrelevant Event").unwrap().is_relevant);
    }

    #[test]
    fn optional_fields_default() {
        let set = CategorySet::from_json(r#"{"Minimal Event": {"relevant": true}}"#, Path::new("inline")).unwrap();
        let minimal = set.get("Minimal Event").unwrap();
        assert_eq!(minimal.description, "");
        assert!(minimal.keywords.is_empty());
    }

    #[test]
    fn relevant_is_required() {
        let err = CategorySet::from_json(r#"{"Broken": {"description": "x"}}"#, Path::new("inline")).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidConfiguration { .. }));
    }

    #[test]
    fn empty_set_rejected() {
        let err = CategorySet::from_json("{}", Path::new("inline")).unwrap_err();
        assert!(matches!(err, ClassifierError::EmptyCategorySet));
    }

    #[test]
    fn names_are_sorted() {
        let set = CategorySet::from_json(SAMPLE, Path::new("inline")).unwrap();
        assert_eq!(set.names(), vec!["Irrelevant Event", "Test Event"]);
    }

    #[test]
    fn missing_file() {
        let err = CategorySet::load("nonexistent_config.json").unwrap_err();
        assert!(matches!(err, ClassifierError::ConfigurationNotFound(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let set = CategorySet::load(file.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.get("Test Event").is_some());
    }

    #[test]
    fn shipped_config_is_valid() {
        let set = CategorySet::load(DEFAULT_EVENT_CONFIG_PATH).unwrap();
        assert_eq!(set.len(), 6);
        let acquisition = set.get("Acquisition").unwrap();
        assert!(acquisition.is_relevant);
        assert!(acquisition.keywords.iter().any(|k| k == "merger"));
        assert!(!set.get("Scheduling Event").unwrap().is_relevant);
        for descriptor in set.iter() {
            assert!(!descriptor.description.is_empty(), "{} has no description", descriptor.name);
        }
    }
}
