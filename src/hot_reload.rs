// Shader hot reload
//
// Watches the directories holding the configured .spv files. The notify
// callback runs on its own thread and only records paths; the event loop
// drains them and rebuilds the pipelines.

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    changed: Arc<Mutex<HashSet<PathBuf>>>,
    shaders: Vec<PathBuf>,
}

impl ShaderWatcher {
    pub fn new(shader_paths: &[&str]) -> Result<Self> {
        let changed = Arc::new(Mutex::new(HashSet::new()));
        let sink = changed.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if is_write_event(&event.kind) => {
                    let mut changed = sink.lock();
                    changed.extend(
                        event
                            .paths
                            .into_iter()
                            .filter(|p| p.extension().is_some_and(|ext| ext == "spv")),
                    );
                }
                Ok(_) => {}
                Err(e) => log::warn!("Shader watcher error: {}", e),
            }
        })
        .context("Failed to create shader watcher")?;

        for dir in watch_dirs(shader_paths) {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {:?}", dir))?;
            log::info!("Watching {:?} for shader changes", dir);
        }

        Ok(Self {
            _watcher: watcher,
            changed,
            shaders: shader_paths.iter().map(|p| normalize(Path::new(p))).collect(),
        })
    }

    /// Drain recorded changes; true if any of them is one of our shaders
    pub fn take_changes(&self) -> bool {
        let changed: Vec<PathBuf> = self.changed.lock().drain().collect();
        if changed.is_empty() {
            return false;
        }

        let changed: Vec<PathBuf> = changed.iter().map(|p| normalize(p)).collect();
        let hit = any_watched(&changed, &self.shaders);
        if hit {
            log::info!("Shader change detected: {:?}", changed);
        }
        hit
    }
}

fn is_write_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Parent directories of the shader files, deduplicated
fn watch_dirs(shader_paths: &[&str]) -> BTreeSet<PathBuf> {
    shader_paths
        .iter()
        .map(|path| match Path::new(path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        })
        .collect()
}

/// Absolute form of `path` where it can be resolved
fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Either side may still be relative if it could not be canonicalized
fn any_watched(changed: &[PathBuf], shaders: &[PathBuf]) -> bool {
    changed.iter().any(|path| {
        shaders.iter().any(|shader| {
            path == shader
                || (path.is_relative() && shader.ends_with(path))
                || (shader.is_relative() && path.ends_with(shader))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn test_watch_dirs_are_deduplicated() {
        let dirs = watch_dirs(&[
            "shaders/scene.vert.spv",
            "shaders/scene.frag.spv",
            "other/cube.vert.spv",
            "cube.frag.spv",
        ]);
        let dirs: Vec<_> = dirs.into_iter().collect();
        assert_eq!(
            dirs,
            vec![PathBuf::from("."), PathBuf::from("other"), PathBuf::from("shaders")]
        );
    }

    #[test]
    fn test_only_writes_count() {
        assert!(is_write_event(&EventKind::Create(CreateKind::File)));
        assert!(is_write_event(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_write_event(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_write_event(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn test_changed_paths_match_configured_shaders() {
        let shaders = vec![PathBuf::from("/work/shaders/scene.vert.spv")];

        assert!(any_watched(&[PathBuf::from("/work/shaders/scene.vert.spv")], &shaders));
        assert!(any_watched(&[PathBuf::from("shaders/scene.vert.spv")], &shaders));
        assert!(!any_watched(&[PathBuf::from("/work/shaders/other.spv")], &shaders));
        assert!(!any_watched(&[], &shaders));
    }

    #[test]
    fn test_absolute_event_matches_relative_shader() {
        // A shader path that failed to canonicalize stays relative
        let shaders = vec![PathBuf::from("shaders/cube.frag.spv")];

        assert!(any_watched(&[PathBuf::from("/work/shaders/cube.frag.spv")], &shaders));
        assert!(!any_watched(&[PathBuf::from("/work/shaders/cube.vert.spv")], &shaders));
    }
}
