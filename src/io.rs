use std::path::{Path, PathBuf};

use tokio::fs;

use crate::err::Error;
use crate::models::ExamSettings;

pub const SETTINGS_FILE: &str = "exam_settings.json";
pub const BLOCKLIST_FILE: &str = "blocked_students.json";

/// Storage for the two small admin documents. Paths are injected so tests
/// and deployments can point it anywhere.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    settings_path: PathBuf,
    blocklist_path: PathBuf,
}

impl DocumentStore {
    pub fn new(docs_dir: &Path) -> Self {
        Self {
            settings_path: docs_dir.join(SETTINGS_FILE),
            blocklist_path: docs_dir.join(BLOCKLIST_FILE),
        }
    }

    pub async fn prepare(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Missing document reads as the default; an unreadable one does too,
    /// but is logged so the condition stays visible.
    pub async fn load_settings(&self) -> ExamSettings {
        match fs::read(&self.settings_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                log::warn!(
                    "Unreadable exam settings document `{}`, using default: {}",
                    self.settings_path.display(),
                    err
                );
                ExamSettings::default()
            }),
            Err(_) => ExamSettings::default(),
        }
    }

    pub async fn save_settings(&self, settings: &ExamSettings) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.settings_path, bytes).await?;
        Ok(())
    }

    /// Ordered on disk, a set in meaning.
    pub async fn load_blocklist(&self) -> Vec<String> {
        match fs::read(&self.blocklist_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                log::warn!(
                    "Unreadable blocklist document `{}`, using empty list: {}",
                    self.blocklist_path.display(),
                    err
                );
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    pub async fn save_blocklist(&self, blocklist: &[String]) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(blocklist)?;
        fs::write(&self.blocklist_path, bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExamType;
    use uuid::Uuid;

    fn scratch_store() -> DocumentStore {
        let dir = std::env::temp_dir().join(format!("docket-docs-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        DocumentStore::new(&dir)
    }

    #[tokio::test]
    async fn missing_documents_read_as_defaults() {
        let store = scratch_store();
        assert_eq!(store.load_settings().await, ExamSettings::default());
        assert!(store.load_blocklist().await.is_empty());
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let store = scratch_store();
        let settings = ExamSettings {
            active_exam: ExamType::Exam,
        };
        store.save_settings(&settings).await.unwrap();
        assert_eq!(store.load_settings().await, settings);
    }

    #[tokio::test]
    async fn corrupt_settings_fall_back_to_default() {
        let store = scratch_store();
        tokio::fs::write(&store.settings_path, b"{not json")
            .await
            .unwrap();
        assert_eq!(store.load_settings().await, ExamSettings::default());
    }

    #[tokio::test]
    async fn blocklist_round_trip() {
        let store = scratch_store();
        let blocklist = vec!["CU-2021-001".to_string(), "CU-2021-002".to_string()];
        store.save_blocklist(&blocklist).await.unwrap();
        assert_eq!(store.load_blocklist().await, blocklist);
    }
}
