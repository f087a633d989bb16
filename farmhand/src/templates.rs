//! Filesystem template resolver.
//!
//! Templates live under `<root>/<server>/<lang>/<parts...>.png`, with the
//! `common` server directory answering when a server-specific image does
//! not exist. Listing a directory enumerates the basenames, which is how
//! villages and locations are discovered dynamically.

use std::path::{Path, PathBuf};

use crate::errors::AgentError;
use crate::ports::{Lang, TemplateResolver};
use crate::registry::COMMON;

pub struct FsTemplates {
    root: PathBuf,
}

impl FsTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candidate(&self, server: &str, lang: Lang, parts: &[&str]) -> PathBuf {
        let mut path = self.root.join(server).join(lang.as_str());
        for part in parts {
            path.push(part);
        }
        path.set_extension("png");
        path
    }

    fn dir(&self, server: &str, lang: Lang, parts: &[&str]) -> PathBuf {
        let mut path = self.root.join(server).join(lang.as_str());
        for part in parts {
            path.push(part);
        }
        path
    }
}

impl TemplateResolver for FsTemplates {
    fn resolve(&self, server: &str, lang: Lang, parts: &[&str]) -> Result<PathBuf, AgentError> {
        let specific = self.candidate(server, lang, parts);
        if specific.is_file() {
            return Ok(specific);
        }
        let fallback = self.candidate(COMMON, lang, parts);
        if fallback.is_file() {
            return Ok(fallback);
        }
        Err(AgentError::TemplateMissing(format!(
            "{} (also tried {})",
            specific.display(),
            fallback.display()
        )))
    }

    fn list(&self, server: &str, lang: Lang, parts: &[&str]) -> Result<Vec<String>, AgentError> {
        let dir = self.dir(server, lang, parts);
        let dir = if dir.is_dir() {
            dir
        } else {
            self.dir(COMMON, lang, parts)
        };
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            AgentError::TemplateMissing(format!("{}: {e}", dir.display()))
        })?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| stem(&entry.path()))
            .collect();
        names.sort();
        Ok(names)
    }
}

fn stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}
