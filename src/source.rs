//! Document sources consumed by structure discovery
//!
//! A source exposes a document as numbered units (pages) of extracted
//! text, optionally with a native TOC and per-unit images. Rendering and
//! OCR happen upstream; [`TextDocument`] reads their output from disk.

use crate::analysis::{StructureDiscoveryError, TocEntry};
use crate::backend::ImageRef;
use std::fs;
use std::path::{Path, PathBuf};

/// Page separator written by text extractors
const FORM_FEED: char = '\x0c';

/// Sidecar TOC picked up automatically from a unit directory
const DEFAULT_TOC_FILE: &str = "toc.json";

const UNIT_EXTENSIONS: &[&str] = &["txt", "md"];

/// A document as seen by the pipeline
pub trait StructureSource: Send + Sync {
    fn unit_count(&self) -> Result<usize, StructureDiscoveryError>;

    /// TOC embedded in the document, if it has one
    fn native_toc(&self) -> Result<Option<Vec<TocEntry>>, StructureDiscoveryError>;

    fn unit_text(&self, index: usize) -> Result<String, StructureDiscoveryError>;

    fn unit_image(&self, _index: usize) -> Option<ImageRef> {
        None
    }

    /// Document title for the root node
    fn title(&self) -> Option<String> {
        None
    }
}

/// Units held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocument {
    title: Option<String>,
    units: Vec<String>,
    toc: Option<Vec<TocEntry>>,
    images: Vec<Option<ImageRef>>,
}

impl InMemoryDocument {
    pub fn new<S: Into<String>>(units: impl IntoIterator<Item = S>) -> Self {
        Self {
            units: units.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_native_toc(mut self, toc: Vec<TocEntry>) -> Self {
        self.toc = Some(toc);
        self
    }

    pub fn with_image(mut self, index: usize, image: ImageRef) -> Self {
        if self.images.len() <= index {
            self.images.resize(index + 1, None);
        }
        self.images[index] = Some(image);
        self
    }
}

impl StructureSource for InMemoryDocument {
    fn unit_count(&self) -> Result<usize, StructureDiscoveryError> {
        Ok(self.units.len())
    }

    fn native_toc(&self) -> Result<Option<Vec<TocEntry>>, StructureDiscoveryError> {
        Ok(self.toc.clone())
    }

    fn unit_text(&self, index: usize) -> Result<String, StructureDiscoveryError> {
        self.units
            .get(index)
            .cloned()
            .ok_or_else(|| StructureDiscoveryError::UnitUnavailable {
                index,
                reason: format!("document has {} units", self.units.len()),
            })
    }

    fn unit_image(&self, index: usize) -> Option<ImageRef> {
        self.images.get(index).cloned().flatten()
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }
}

#[derive(Debug, Clone)]
enum Units {
    /// Split from one file on form feeds
    Split(Vec<String>),
    /// One file per unit, read on demand
    Files(Vec<PathBuf>),
}

/// Extracted text on disk
///
/// Either a single file whose pages are separated by form feeds, or a
/// directory of `.txt`/`.md` files (one unit each, ordered by file name)
/// where `<name>.png` next to a unit file is that unit's image.
#[derive(Debug, Clone)]
pub struct TextDocument {
    path: PathBuf,
    units: Units,
    toc_path: Option<PathBuf>,
}

impl TextDocument {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StructureDiscoveryError> {
        let path = path.as_ref().to_path_buf();
        if path.is_dir() {
            let mut files = Vec::new();
            for entry in fs::read_dir(&path)? {
                let file = entry?.path();
                let is_unit = file
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| UNIT_EXTENSIONS.contains(&e.to_lowercase().as_str()));
                if is_unit && file.is_file() {
                    files.push(file);
                }
            }
            files.sort();
            let default_toc = path.join(DEFAULT_TOC_FILE);
            Ok(Self {
                toc_path: default_toc.is_file().then_some(default_toc),
                path,
                units: Units::Files(files),
            })
        } else {
            let raw = fs::read_to_string(&path)?;
            let mut pages: Vec<String> = raw.split(FORM_FEED).map(str::to_string).collect();
            // extractors end every page with a form feed
            if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
                pages.pop();
            }
            Ok(Self {
                path,
                units: Units::Split(pages),
                toc_path: None,
            })
        }
    }

    /// Read the native TOC from a JSON file of `{title, level, unit_index}`
    pub fn with_toc_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.toc_path = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StructureSource for TextDocument {
    fn unit_count(&self) -> Result<usize, StructureDiscoveryError> {
        Ok(match &self.units {
            Units::Split(pages) => pages.len(),
            Units::Files(files) => files.len(),
        })
    }

    fn native_toc(&self) -> Result<Option<Vec<TocEntry>>, StructureDiscoveryError> {
        let Some(path) = &self.toc_path else {
            return Ok(None);
        };
        let raw = fs::read_to_string(path)?;
        let entries: Vec<TocEntry> = serde_json::from_str(&raw)
            .map_err(|e| StructureDiscoveryError::MalformedToc(format!("{}: {}", path.display(), e)))?;
        Ok(Some(entries))
    }

    fn unit_text(&self, index: usize) -> Result<String, StructureDiscoveryError> {
        let unavailable = |count: usize| StructureDiscoveryError::UnitUnavailable {
            index,
            reason: format!("document has {} units", count),
        };
        match &self.units {
            Units::Split(pages) => pages.get(index).cloned().ok_or_else(|| unavailable(pages.len())),
            Units::Files(files) => {
                let file = files.get(index).ok_or_else(|| unavailable(files.len()))?;
                Ok(fs::read_to_string(file)?)
            }
        }
    }

    fn unit_image(&self, index: usize) -> Option<ImageRef> {
        let Units::Files(files) = &self.units else {
            return None;
        };
        let image = files.get(index)?.with_extension("png");
        image.is_file().then(|| ImageRef::new(image))
    }

    fn title(&self) -> Option<String> {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
    }
}
