//! Task catalog loading
//!
//! A catalog for a release lives in `<root>/<release>/` as any number of
//! YAML or JSON files, each holding a list of task templates. Files are read
//! in file-name order so catalog order is stable across runs.

use rollout_core::{
    constants::CATALOG_FILE_EXTENSIONS, DeploymentNode, Error, Result, TaskCatalog, TaskTemplate,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Source of raw task catalogs
pub trait CatalogLoader {
    fn load(&self, release_id: &str) -> Result<TaskCatalog>;
}

/// Loads catalogs from a directory tree
#[derive(Debug, Clone)]
pub struct FsCatalogLoader {
    root: PathBuf,
}

impl FsCatalogLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn catalog_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                match e.into_io_error() {
                    Some(source) => Error::file_system(path, source),
                    None => Error::configuration(format!(
                        "filesystem loop while reading catalog at '{}'",
                        path.display()
                    )),
                }
            })?;
            if entry.file_type().is_file() && is_catalog_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

impl CatalogLoader for FsCatalogLoader {
    fn load(&self, release_id: &str) -> Result<TaskCatalog> {
        let dir = self.root.join(release_id);
        if !dir.is_dir() {
            return Err(Error::configuration(format!(
                "no catalog for release '{release_id}' under '{}'",
                self.root.display()
            )));
        }

        let mut templates = Vec::new();
        for file in self.catalog_files(&dir)? {
            let mut loaded: Vec<TaskTemplate> = read_document(&file)?;
            debug!(file = %file.display(), tasks = loaded.len(), "loaded catalog file");
            templates.append(&mut loaded);
        }

        TaskCatalog::new(release_id, templates)
    }
}

/// Read the node list handed to the planner
pub fn load_nodes(path: &Path) -> Result<Vec<DeploymentNode>> {
    read_document(path)
}

fn is_catalog_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CATALOG_FILE_EXTENSIONS.contains(&ext))
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::file_system(path, e))?;
    let value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(value)
}
