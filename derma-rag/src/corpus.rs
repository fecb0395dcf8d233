//! Loading the reference corpus: a flat JSON object of topic name to
//! reference text.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::CorpusLoadError;

/// Origin label used for corpora parsed from memory.
const MEMORY_ORIGIN: &str = "<memory>";

/// One topic of the reference corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceEntry {
    /// Unique topic key, e.g. `atopic_dermatitis`.
    pub topic_name: String,
    /// The reference text for the topic.
    pub reference_text: String,
}

/// The loaded corpus, ordered by topic name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceCorpus {
    entries: BTreeMap<String, ReferenceEntry>,
}

impl ReferenceCorpus {
    /// Build a corpus from `(topic, text)` pairs, rejecting duplicate topics.
    pub fn from_entries<I, K, V>(pairs: I) -> Result<Self, CorpusLoadError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries = BTreeMap::new();
        for (topic, text) in pairs {
            let topic_name = topic.into();
            if entries.contains_key(&topic_name) {
                return Err(CorpusLoadError::DuplicateTopic { topic: topic_name });
            }
            let entry = ReferenceEntry { topic_name: topic_name.clone(), reference_text: text.into() };
            entries.insert(topic_name, entry);
        }
        Ok(Self { entries })
    }

    /// Parse a corpus from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, CorpusLoadError> {
        parse_corpus(json, MEMORY_ORIGIN)
    }

    /// Look up a single entry.
    pub fn get(&self, topic: &str) -> Option<&ReferenceEntry> {
        self.entries.get(topic)
    }

    /// Iterate over entries in topic order.
    pub fn entries(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.values()
    }

    /// Topic names in sorted order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of topics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the corpus holds no topics.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read the corpus file at `path`.
///
/// # Errors
///
/// Returns [`CorpusLoadError`] if the file is missing, unreadable, not JSON,
/// or not a flat object of string values.
pub fn load_corpus(path: impl AsRef<Path>) -> Result<ReferenceCorpus, CorpusLoadError> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            CorpusLoadError::NotFound { path: shown.clone() }
        } else {
            CorpusLoadError::Read { path: shown.clone(), source }
        }
    })?;

    let corpus = parse_corpus(&content, &shown)?;
    info!(path = %shown, topic_count = corpus.len(), "loaded reference corpus");
    Ok(corpus)
}

fn parse_corpus(json: &str, origin: &str) -> Result<ReferenceCorpus, CorpusLoadError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|source| CorpusLoadError::Parse { origin: origin.to_string(), source })?;

    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(CorpusLoadError::NotAnObject {
                origin: origin.to_string(),
                found: json_type(&other),
            });
        }
    };

    let mut pairs = Vec::with_capacity(object.len());
    for (topic, value) in object {
        match value {
            Value::String(text) => pairs.push((topic, text)),
            other => {
                return Err(CorpusLoadError::NonStringValue {
                    origin: origin.to_string(),
                    topic,
                    found: json_type(&other),
                });
            }
        }
    }

    debug!(origin, topic_count = pairs.len(), "parsed corpus");
    ReferenceCorpus::from_entries(pairs)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_object_in_topic_order() {
        let corpus = ReferenceCorpus::from_json_str(
            r#"{"psoriasis": "Scaly plaques.", "atopic_dermatitis": "Itching and redness."}"#,
        )
        .unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.topics().collect::<Vec<_>>(), vec!["atopic_dermatitis", "psoriasis"]);
        assert_eq!(corpus.get("psoriasis").unwrap().reference_text, "Scaly plaques.");
    }

    #[test]
    fn empty_object_is_an_empty_corpus() {
        let corpus = ReferenceCorpus::from_json_str("{}").unwrap();
        assert!(corpus.is_empty());
    }

    #[test]
    fn rejects_non_object_root() {
        let err = ReferenceCorpus::from_json_str(r#"["a", "b"]"#).unwrap_err();
        assert!(matches!(err, CorpusLoadError::NotAnObject { found: "array", .. }));
    }

    #[test]
    fn rejects_nested_values() {
        let err = ReferenceCorpus::from_json_str(r#"{"acne": {"text": "x"}}"#).unwrap_err();
        match err {
            CorpusLoadError::NonStringValue { topic, found, .. } => {
                assert_eq!(topic, "acne");
                assert_eq!(found, "object");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_json() {
        let err = ReferenceCorpus::from_json_str(r#"{"acne": "#).unwrap_err();
        assert!(matches!(err, CorpusLoadError::Parse { .. }));
    }

    #[test]
    fn rejects_duplicate_topics_from_pairs() {
        let err = ReferenceCorpus::from_entries([("acne", "a"), ("acne", "b")]).unwrap_err();
        assert!(matches!(err, CorpusLoadError::DuplicateTopic { topic } if topic == "acne"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_corpus(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CorpusLoadError::NotFound { .. }));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medical_dic.json");
        std::fs::write(&path, r#"{"atopic_dermatitis": "Atopic dermatitis causes itching."}"#)
            .unwrap();

        let corpus = load_corpus(&path).unwrap();
        assert_eq!(corpus.len(), 1);
        assert!(corpus.get("atopic_dermatitis").is_some());
    }
}
