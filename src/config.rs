use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Lifecycle stage of a note. Each stage owns one storage directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Inbox,
    Permanent,
    Reference,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Inbox, Stage::Permanent, Stage::Reference];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Inbox => "Inbox",
            Stage::Permanent => "Permanent",
            Stage::Reference => "Reference",
        }
    }

    pub fn next(self) -> Stage {
        match self {
            Stage::Inbox => Stage::Permanent,
            Stage::Permanent => Stage::Reference,
            Stage::Reference => Stage::Inbox,
        }
    }

    /// Reference notes are a reserved root: nothing is created or linked there yet.
    pub fn is_active(self) -> bool {
        !matches!(self, Stage::Reference)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StorageLayout {
    #[serde(default = "default_inbox")]
    pub inbox: PathBuf,
    #[serde(default = "default_permanent")]
    pub permanent: PathBuf,
    #[serde(default = "default_reference")]
    pub reference: PathBuf,
}

fn default_inbox() -> PathBuf {
    PathBuf::from("notes/inbox")
}

fn default_permanent() -> PathBuf {
    PathBuf::from("notes/permanent_notes")
}

fn default_reference() -> PathBuf {
    PathBuf::from("reference_box/reference_notes")
}

impl Default for StorageLayout {
    fn default() -> Self {
        StorageLayout {
            inbox: default_inbox(),
            permanent: default_permanent(),
            reference: default_reference(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub layout: StorageLayout,
}

impl Config {
    /// Resolve the knowledge-base root from the environment and read
    /// `<root>/config.json` when present.
    pub fn load() -> Result<Self> {
        let root = std::env::var("ZETTELBOX_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME")
                    .or_else(|_| std::env::var("USERPROFILE"))
                    .unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".zettelbox")
            });
        Self::from_root(root)
    }

    pub fn from_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config_file = root.join("config.json");
        let layout = if config_file.exists() {
            let raw = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read {}", config_file.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid configuration in {}", config_file.display()))?
        } else {
            StorageLayout::default()
        };
        Ok(Config { root, layout })
    }

    /// Default layout under an explicit root, ignoring any config file.
    #[cfg(test)]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Config {
            root: root.into(),
            layout: StorageLayout::default(),
        }
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        let relative: &Path = match stage {
            Stage::Inbox => &self.layout.inbox,
            Stage::Permanent => &self.layout.permanent,
            Stage::Reference => &self.layout.reference,
        };
        // join() keeps absolute paths as-is
        self.root.join(relative)
    }

    /// Directories searched when resolving a zk_uid, in lookup order.
    pub fn link_directories(&self) -> Vec<PathBuf> {
        Stage::ALL
            .into_iter()
            .filter(|stage| stage.is_active())
            .map(|stage| self.stage_dir(stage))
            .collect()
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("zettelbox.log")
    }
}
