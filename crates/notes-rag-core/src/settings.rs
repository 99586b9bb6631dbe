//! Engine settings, engine state, and their persisted form.
//!
//! [`PersistedSettings`] is the key-value view written to external storage
//! on every mutation. Its serialized keys are fixed:
//!
//! | Key | Type |
//! |-----|------|
//! | `ragChunkSize` | int |
//! | `ragChunkOverlap` | int |
//! | `ragResultCount` | int |
//! | `ragSimilarityThreshold` | float |
//! | `isVectorDbEnabled` | bool |
//! | `isRagEnabled` | bool |
//! | `lastVectorProcessTime` | epoch millis |

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::chunk::validate_window;
use crate::error::{RagError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_RESULT_COUNT: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Chunking and retrieval parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub result_count: usize,
    pub similarity_threshold: f32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            result_count: DEFAULT_RESULT_COUNT,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl RagSettings {
    pub fn validate(&self) -> Result<()> {
        validate_window(self.chunk_size, self.chunk_overlap)?;
        if self.result_count == 0 {
            return Err(RagError::InvalidConfig(
                "result count must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::InvalidConfig(format!(
                "similarity threshold must be in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Enablement and processing state of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineState {
    pub vector_db_enabled: bool,
    pub rag_enabled: bool,
    pub is_processing: bool,
    /// Epoch milliseconds of the last completed full reindex.
    pub last_process_time: Option<i64>,
    pub document_count: usize,
}

/// The persisted key-value form of [`RagSettings`] and [`EngineState`].
///
/// Integers are signed so that hand-edited negative values reach
/// validation instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedSettings {
    #[serde(rename = "ragChunkSize")]
    pub chunk_size: i64,
    #[serde(rename = "ragChunkOverlap")]
    pub chunk_overlap: i64,
    #[serde(rename = "ragResultCount")]
    pub result_count: i64,
    #[serde(rename = "ragSimilarityThreshold")]
    pub similarity_threshold: f64,
    #[serde(rename = "isVectorDbEnabled")]
    pub vector_db_enabled: bool,
    #[serde(rename = "isRagEnabled")]
    pub rag_enabled: bool,
    #[serde(
        rename = "lastVectorProcessTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_process_time: Option<i64>,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self::from_parts(&RagSettings::default(), &EngineState::default())
    }
}

impl PersistedSettings {
    pub fn from_parts(settings: &RagSettings, state: &EngineState) -> Self {
        Self {
            chunk_size: settings.chunk_size as i64,
            chunk_overlap: settings.chunk_overlap as i64,
            result_count: settings.result_count as i64,
            similarity_threshold: f64::from(settings.similarity_threshold),
            vector_db_enabled: state.vector_db_enabled,
            rag_enabled: state.rag_enabled,
            last_process_time: state.last_process_time,
        }
    }

    /// Validated [`RagSettings`] from the persisted values.
    pub fn rag_settings(&self) -> Result<RagSettings> {
        let non_negative = |name: &str, value: i64| -> Result<usize> {
            usize::try_from(value).map_err(|_| {
                RagError::InvalidConfig(format!("{name} must not be negative, got {value}"))
            })
        };
        let settings = RagSettings {
            chunk_size: non_negative("ragChunkSize", self.chunk_size)?,
            chunk_overlap: non_negative("ragChunkOverlap", self.chunk_overlap)?,
            result_count: non_negative("ragResultCount", self.result_count)?,
            similarity_threshold: self.similarity_threshold as f32,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Engine state at startup. `is_processing` always starts false and
    /// RAG is dropped if the vector database is off.
    pub fn engine_state(&self) -> EngineState {
        EngineState {
            vector_db_enabled: self.vector_db_enabled,
            rag_enabled: self.rag_enabled && self.vector_db_enabled,
            is_processing: false,
            last_process_time: self.last_process_time,
            document_count: 0,
        }
    }
}

/// External storage for [`PersistedSettings`].
///
/// Implementations are synchronous: a save is a small local write and is
/// performed while the engine holds its state lock.
pub trait SettingsStore: Send + Sync {
    /// Load the persisted settings, or defaults if nothing was saved yet.
    fn load(&self) -> anyhow::Result<PersistedSettings>;
    fn save(&self, settings: &PersistedSettings) -> anyhow::Result<()>;
}

/// In-memory [`SettingsStore`] for tests and embedded hosts.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    inner: Mutex<Option<PersistedSettings>>,
    fail_saves: Mutex<bool>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: PersistedSettings) -> Self {
        Self {
            inner: Mutex::new(Some(settings)),
            fail_saves: Mutex::new(false),
        }
    }

    /// The last saved value, if any.
    pub fn saved(&self) -> Option<PersistedSettings> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Make subsequent saves fail, to exercise rollback paths.
    pub fn set_fail_saves(&self, fail: bool) {
        *self
            .fail_saves
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fail;
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> anyhow::Result<PersistedSettings> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, settings: &PersistedSettings) -> anyhow::Result<()> {
        if *self
            .fail_saves
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            return Err(RagError::Storage("settings store rejected the write".to_string()).into());
        }
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        RagSettings::default().validate().unwrap();
        let persisted = PersistedSettings::default();
        assert_eq!(persisted.rag_settings().unwrap(), RagSettings::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            RagSettings {
                chunk_size: 0,
                chunk_overlap: 0,
                ..RagSettings::default()
            },
            RagSettings {
                chunk_size: 100,
                chunk_overlap: 100,
                ..RagSettings::default()
            },
            RagSettings {
                result_count: 0,
                ..RagSettings::default()
            },
            RagSettings {
                similarity_threshold: 1.5,
                ..RagSettings::default()
            },
            RagSettings {
                similarity_threshold: -0.1,
                ..RagSettings::default()
            },
        ];
        for settings in bad {
            assert!(
                matches!(settings.validate(), Err(RagError::InvalidConfig(_))),
                "expected rejection of {:?}",
                settings
            );
        }
    }

    #[test]
    fn test_negative_persisted_overlap_rejected() {
        let persisted = PersistedSettings {
            chunk_overlap: -5,
            ..PersistedSettings::default()
        };
        assert!(matches!(
            persisted.rag_settings(),
            Err(RagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_persisted_keys() {
        let json = serde_json::to_value(PersistedSettings::default()).unwrap();
        for key in [
            "ragChunkSize",
            "ragChunkOverlap",
            "ragResultCount",
            "ragSimilarityThreshold",
            "isVectorDbEnabled",
            "isRagEnabled",
        ] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
        assert!(json.get("lastVectorProcessTime").is_none());
    }

    #[test]
    fn test_missing_keys_default() {
        let persisted: PersistedSettings =
            serde_json::from_str(r#"{"ragChunkSize": 512, "isVectorDbEnabled": true}"#).unwrap();
        assert_eq!(persisted.chunk_size, 512);
        assert_eq!(persisted.chunk_overlap, DEFAULT_CHUNK_OVERLAP as i64);
        assert!(persisted.vector_db_enabled);
        assert!(!persisted.rag_enabled);
    }

    #[test]
    fn test_engine_state_repairs_rag_without_vector_db() {
        let persisted = PersistedSettings {
            vector_db_enabled: false,
            rag_enabled: true,
            ..PersistedSettings::default()
        };
        let state = persisted.engine_state();
        assert!(!state.rag_enabled);
        assert!(!state.is_processing);
    }

    #[test]
    fn test_memory_store_roundtrip_and_failure() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.load().unwrap(), PersistedSettings::default());

        let mut settings = PersistedSettings::default();
        settings.vector_db_enabled = true;
        store.save(&settings).unwrap();
        assert!(store.load().unwrap().vector_db_enabled);

        store.set_fail_saves(true);
        assert!(store.save(&PersistedSettings::default()).is_err());
        assert!(store.load().unwrap().vector_db_enabled);
    }
}
