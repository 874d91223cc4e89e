//! Append-only store of raw extraction artifacts.
//!
//! Files are named `<city-slug>_<tag>_<YYYYMMDD_HHMMSS>.json`. A second save
//! for the same city and tag within one second gets a numeric suffix so
//! nothing is ever overwritten.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::City;

// ---

/// Outcome recorded in an artifact's filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactTag {
    Raw,
    Empty,
    Error,
}

impl ArtifactTag {
    // ---
    pub const ALL: [ArtifactTag; 3] = [ArtifactTag::Raw, ArtifactTag::Empty, ArtifactTag::Error];

    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            ArtifactTag::Raw => "raw",
            ArtifactTag::Empty => "empty",
            ArtifactTag::Error => "error",
        }
    }
}

/// Reference to a saved raw artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    // ---
    pub city: String,
    pub tag: ArtifactTag,
    pub path: PathBuf,
}

impl Artifact {
    /// Rebuild a reference from a filename written by [`RawArtifactStore`].
    pub fn from_path(path: &Path) -> Option<Artifact> {
        // ---
        let stem = path.file_stem()?.to_str()?;

        // City slugs may contain '_' themselves, so split on the last tag marker
        let (city_slug, tag) = ArtifactTag::ALL
            .iter()
            .filter_map(|tag| {
                stem.rfind(&format!("_{}_", tag.as_str()))
                    .map(|pos| (pos, *tag))
            })
            .max_by_key(|(pos, _)| *pos)
            .map(|(pos, tag)| (&stem[..pos], tag))?;

        if city_slug.is_empty() {
            return None;
        }

        Some(Artifact {
            city: city_from_slug(city_slug),
            tag,
            path: path.to_path_buf(),
        })
    }
}

/// `"New Delhi"` → `"new-delhi"`.
pub fn city_slug(city: &str) -> String {
    // ---
    city.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// `"new-delhi"` → `"New Delhi"`. Lossy for names that are not plain
/// title case; prefer [`RawArtifactStore::list_known`] when the configured
/// cities are at hand.
pub fn city_from_slug(slug: &str) -> String {
    // ---
    slug.split(['-', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Directory of timestamped JSON artifacts.
#[derive(Debug, Clone)]
pub struct RawArtifactStore {
    // ---
    dir: PathBuf,
}

impl RawArtifactStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        // ---
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create raw artifact dir {}", dir.display()))?;
        Ok(RawArtifactStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `payload` as pretty JSON under a fresh, unique filename.
    pub fn save(
        &self,
        city: &str,
        tag: ArtifactTag,
        payload: &serde_json::Value,
    ) -> Result<Artifact> {
        // ---
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let base = format!("{}_{}_{}", city_slug(city), tag.as_str(), timestamp);

        let mut path = self.dir.join(format!("{base}.json"));
        let mut suffix = 1;
        while path.exists() {
            path = self.dir.join(format!("{base}_{suffix}.json"));
            suffix += 1;
        }

        let body = serde_json::to_vec_pretty(payload)?;
        fs::write(&path, body)
            .with_context(|| format!("Failed to write artifact {}", path.display()))?;

        Ok(Artifact {
            city: city.to_string(),
            tag,
            path,
        })
    }

    /// Every artifact in the store, sorted by filename.
    ///
    /// Files that don't follow the naming scheme are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Artifact>> {
        // ---
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read raw artifact dir {}", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("json"))
            })
            .collect();
        paths.sort();

        let mut artifacts = Vec::with_capacity(paths.len());
        for path in paths {
            match Artifact::from_path(&path) {
                Some(artifact) => artifacts.push(artifact),
                None => tracing::warn!("Skipping unrecognised raw file {}", path.display()),
            }
        }
        Ok(artifacts)
    }

    /// Like [`list`](Self::list), but cities whose slug matches a configured
    /// city get that city's exact name back.
    pub fn list_known(&self, cities: &[City]) -> Result<Vec<Artifact>> {
        // ---
        let mut artifacts = self.list()?;
        for artifact in &mut artifacts {
            let slug = city_slug(&artifact.city);
            if let Some(city) = cities.iter().find(|c| city_slug(&c.name) == slug) {
                artifact.city = city.name.clone();
            }
        }
        Ok(artifacts)
    }
}
