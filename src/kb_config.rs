//! Per-folder knowledge base settings (`kbconfig.yaml`).
//!
//! ```yaml
//! name: manuals
//! description: Maintenance manuals
//! public: false
//! ```
//!
//! `description` and `public` are optional. When `name` is omitted the folder
//! name is used.

use serde::Deserialize;
use std::path::Path;

use crate::error::FolderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseConfig {
    pub name: String,
    pub description: String,
    pub public: bool,
}

#[derive(Debug, Deserialize)]
struct RawKbConfig {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    public: bool,
}

impl KnowledgeBaseConfig {
    /// Load the config file `file_name` inside `folder`.
    pub fn load(folder: &Path, file_name: &str) -> Result<Self, FolderError> {
        let path = folder.join(file_name);
        let content = std::fs::read_to_string(&path).map_err(|e| FolderError::ConfigLoad {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let fallback_name = folder
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        Self::parse(&content, fallback_name).map_err(|message| FolderError::ConfigLoad {
            path,
            message,
        })
    }

    /// Parse YAML content, defaulting the name to `fallback_name`.
    pub fn parse(content: &str, fallback_name: &str) -> Result<Self, String> {
        // An empty file is a valid config with every field defaulted.
        let raw: RawKbConfig = if content.trim().is_empty() {
            RawKbConfig {
                name: None,
                description: None,
                public: false,
            }
        } else {
            serde_yaml::from_str(content).map_err(|e| e.to_string())?
        };

        let name = raw
            .name
            .unwrap_or_else(|| fallback_name.to_string())
            .trim()
            .to_string();
        if name.is_empty() {
            return Err("knowledge base name must not be empty".to_string());
        }

        Ok(Self {
            name,
            description: raw.description.unwrap_or_default(),
            public: raw.public,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_full_config() {
        let cfg = KnowledgeBaseConfig::parse(
            "name: manuals\ndescription: Service manuals\npublic: true\n",
            "folder",
        )
        .unwrap();
        assert_eq!(cfg.name, "manuals");
        assert_eq!(cfg.description, "Service manuals");
        assert!(cfg.public);
    }

    #[test]
    fn test_defaults() {
        let cfg = KnowledgeBaseConfig::parse("name: manuals\n", "folder").unwrap();
        assert_eq!(cfg.description, "");
        assert!(!cfg.public);
    }

    #[test]
    fn test_name_falls_back_to_folder() {
        let cfg = KnowledgeBaseConfig::parse("description: x\n", "handbooks").unwrap();
        assert_eq!(cfg.name, "handbooks");

        let cfg = KnowledgeBaseConfig::parse("", "handbooks").unwrap();
        assert_eq!(cfg.name, "handbooks");
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(KnowledgeBaseConfig::parse("name: \"  \"\n", "folder").is_err());
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        assert!(KnowledgeBaseConfig::parse("name: [unclosed\n", "folder").is_err());
        assert!(KnowledgeBaseConfig::parse("public: maybe\n", "folder").is_err());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = KnowledgeBaseConfig::load(tmp.path(), "kbconfig.yaml").unwrap_err();
        assert!(matches!(err, FolderError::ConfigLoad { .. }));
    }

    #[test]
    fn test_load_from_folder() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("manuals");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("kbconfig.yaml"), "public: true\n").unwrap();

        let cfg = KnowledgeBaseConfig::load(&folder, "kbconfig.yaml").unwrap();
        assert_eq!(cfg.name, "manuals");
        assert!(cfg.public);
    }
}
