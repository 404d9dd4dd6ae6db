use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::error::{PromptError, Result};
use crate::template::Template;

type TemplateMap = HashMap<String, Arc<Template>>;

/// Hot-reloadable set of named prompt templates (§4.3).
///
/// The active set is swapped atomically via `arc-swap` so in-flight
/// `render` calls always see a consistent set of templates, never a
/// half-reloaded directory.
pub struct PromptRegistry {
    dir: PathBuf,
    templates: ArcSwap<TemplateMap>,
}

impl PromptRegistry {
    pub async fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let templates = load_dir(&dir).await?;
        Ok(Self {
            dir,
            templates: ArcSwap::from_pointee(templates),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.load().get(name).cloned()
    }

    pub fn render(&self, name: &str, values: &HashMap<String, String>) -> Result<String> {
        let template = self
            .get(name)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))?;
        template.render(values)
    }

    /// Re-read the prompt directory and atomically swap in the new set.
    /// A failed reload (missing directory, unreadable file) logs a warning
    /// and leaves the previous set of templates in place — it never panics
    /// and never leaves the registry partially updated.
    pub async fn reload(&self) {
        match load_dir(&self.dir).await {
            Ok(fresh) => {
                let count = fresh.len();
                self.templates.store(Arc::new(fresh));
                info!(count, dir = %self.dir.display(), "prompt registry reloaded");
            }
            Err(err) => {
                warn!(err = %err, dir = %self.dir.display(), "prompt registry reload failed, keeping previous set");
            }
        }
    }
}

async fn load_dir(dir: &Path) -> Result<TemplateMap> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|source| PromptError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut templates = TemplateMap::new();
    while let Some(entry) = entries.next_entry().await.map_err(|source| PromptError::Io {
        path: dir.display().to_string(),
        source,
    })? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = tokio::fs::read_to_string(&path).await.map_err(|source| PromptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        templates.insert(stem.to_string(), Arc::new(Template::parse(stem, raw)));
    }
    Ok(templates)
}
