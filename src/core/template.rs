//! Background template store and exact-match resolution.
//!
//! Templates live under `<root>/<variant>/<language>/` as
//! `bg_<PARAM>[_<low>-<high>cm].png`, next to a JSON descriptor with the
//! geospatial reference of the map frame and its reserved overlay regions:
//!
//! ```json
//! {
//!   "projection": "EPSG:3857",
//!   "extent": [1300000.0, 5900000.0, 2700000.0, 6600000.0],
//!   "frame": { "x": 24, "y": 94, "width": 850, "height": 906 },
//!   "reserved": [{ "x": 640, "y": 780, "width": 230, "height": 210 }]
//! }
//! ```
//!
//! The descriptor is read from `<stem>.json`, or from `template.json` shared by
//! every template in the directory.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::naming::ParameterIdentity;
use crate::core::processing::grid::GridSpec;
use crate::types::{Language, TemplateKey, Variant};

pub const SHARED_DESCRIPTOR: &str = "template.json";

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ResolutionError {
    #[error("no template for {stem} in {key}")]
    TemplateNotFound { key: TemplateKey, stem: String },
    #[error("template asset {path:?} is unusable: {reason}")]
    AssetCorrupt { path: PathBuf, reason: String },
}

impl ResolutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionError::TemplateNotFound { .. } => "TemplateNotFound",
            ResolutionError::AssetCorrupt { .. } => "AssetCorrupt",
        }
    }
}

/// Pixel rectangle in template image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }
}

/// Sidecar describing where and in which reference frame the map is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub projection: String,
    /// [min_x, min_y, max_x, max_y] in `projection` units
    pub extent: [f64; 4],
    pub frame: PixelRect,
    #[serde(default)]
    pub reserved: Vec<PixelRect>,
}

/// A loaded background template. Read-only for the pipeline.
#[derive(Debug, Clone)]
pub struct TemplateAsset {
    pub key: TemplateKey,
    pub path: PathBuf,
    pub background: RgbaImage,
    pub projection: String,
    pub extent: [f64; 4],
    pub frame: PixelRect,
    pub reserved: Vec<PixelRect>,
}

impl TemplateAsset {
    /// Grid of the map frame: one cell per frame pixel over the template extent.
    pub fn grid(&self) -> GridSpec {
        GridSpec::from_extent(
            self.extent,
            self.frame.width as usize,
            self.frame.height as usize,
        )
    }

    /// Validate a descriptor against its decoded background.
    pub fn from_parts(
        key: TemplateKey,
        path: PathBuf,
        background: RgbaImage,
        descriptor: TemplateDescriptor,
    ) -> Result<Self, ResolutionError> {
        let corrupt = |reason: String| ResolutionError::AssetCorrupt {
            path: path.clone(),
            reason,
        };
        let TemplateDescriptor {
            projection,
            extent,
            frame,
            reserved,
        } = descriptor;

        if projection.trim().is_empty() {
            return Err(corrupt("descriptor has an empty projection".into()));
        }
        let [min_x, min_y, max_x, max_y] = extent;
        if !(min_x < max_x && min_y < max_y) {
            return Err(corrupt(format!("degenerate extent {:?}", extent)));
        }
        let (width, height) = background.dimensions();
        if frame.width == 0
            || frame.height == 0
            || frame.x as u64 + frame.width as u64 > width as u64
            || frame.y as u64 + frame.height as u64 > height as u64
        {
            return Err(corrupt(format!(
                "frame {:?} does not fit a {}x{} background",
                frame, width, height
            )));
        }

        Ok(Self {
            key,
            path: path.clone(),
            background,
            projection,
            extent,
            frame,
            reserved,
        })
    }
}

/// Enumerated template directories, one per key.
pub type TemplateIndex = BTreeMap<TemplateKey, PathBuf>;

/// Read-only source of background templates.
pub trait TemplateStore: Send + Sync {
    fn list_templates(&self) -> std::io::Result<TemplateIndex>;

    fn load_asset(
        &self,
        key: TemplateKey,
        asset_ref: &Path,
        identity: &ParameterIdentity,
    ) -> Result<TemplateAsset, ResolutionError>;
}

/// Template store backed by the `<root>/<variant>/<language>/` directory tree.
#[derive(Debug, Clone)]
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn subdirs(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    dirs.push((name.to_string(), path.clone()));
                }
            }
        }
        Ok(dirs)
    }
}

impl TemplateStore for FsTemplateStore {
    fn list_templates(&self) -> std::io::Result<TemplateIndex> {
        let mut index = TemplateIndex::new();
        for (variant_name, variant_dir) in Self::subdirs(&self.root)? {
            let Some(variant) = Variant::from_token(&variant_name) else {
                debug!("Ignoring non-variant directory {:?}", variant_dir);
                continue;
            };
            for (language_name, language_dir) in Self::subdirs(&variant_dir)? {
                match Language::from_token(&language_name) {
                    Some(language) => {
                        index.insert(TemplateKey::new(language, variant), language_dir);
                    }
                    None => debug!("Ignoring non-language directory {:?}", language_dir),
                }
            }
        }
        info!(
            "Template store {:?}: {} language/variant sets",
            self.root,
            index.len()
        );
        Ok(index)
    }

    fn load_asset(
        &self,
        key: TemplateKey,
        asset_ref: &Path,
        identity: &ParameterIdentity,
    ) -> Result<TemplateAsset, ResolutionError> {
        let stem = identity.canonical_stem();
        let png_path = asset_ref.join(format!("{}.png", stem));
        if !png_path.is_file() {
            return Err(ResolutionError::TemplateNotFound { key, stem });
        }

        let corrupt = |path: &Path, reason: String| ResolutionError::AssetCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let own_descriptor = asset_ref.join(format!("{}.json", stem));
        let descriptor_path = if own_descriptor.is_file() {
            own_descriptor
        } else {
            asset_ref.join(SHARED_DESCRIPTOR)
        };
        let descriptor_text = std::fs::read_to_string(&descriptor_path)
            .map_err(|e| corrupt(&descriptor_path, format!("descriptor unreadable: {}", e)))?;
        let descriptor: TemplateDescriptor = serde_json::from_str(&descriptor_text)
            .map_err(|e| corrupt(&descriptor_path, format!("descriptor invalid: {}", e)))?;

        let background = image::open(&png_path)
            .map_err(|e| corrupt(&png_path, format!("background undecodable: {}", e)))?
            .to_rgba8();

        debug!("Loaded template {:?} for {}", png_path, key);
        TemplateAsset::from_parts(key, png_path, background, descriptor)
    }
}

/// Exact `(language, variant)` resolution over the store's available set.
#[derive(Clone)]
pub struct TemplateResolver {
    store: Arc<dyn TemplateStore>,
    available: TemplateIndex,
}

impl TemplateResolver {
    /// Enumerate the store once; failure here is fatal for the run.
    pub fn new(store: Arc<dyn TemplateStore>) -> std::io::Result<Self> {
        let available = store.list_templates()?;
        Ok(Self { store, available })
    }

    /// Asset for `key` and the identity's canonical stem. A missing key or stem is
    /// never substituted by another language, variant or depth.
    pub fn resolve(
        &self,
        key: TemplateKey,
        identity: &ParameterIdentity,
    ) -> Result<TemplateAsset, ResolutionError> {
        let asset_ref =
            self.available
                .get(&key)
                .ok_or_else(|| ResolutionError::TemplateNotFound {
                    key,
                    stem: identity.canonical_stem(),
                })?;
        self.store.load_asset(key, asset_ref, identity)
    }
}
