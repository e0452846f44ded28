//! Shared fixtures: an in-memory raster engine, template trees on disk and
//! scripted remote targets.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use climcomp::core::processing::grid::GeoRaster;
use climcomp::core::template::{PixelRect, SHARED_DESCRIPTOR, TemplateDescriptor};
use climcomp::transfer::{RemoteEntry, RemoteSession, RemoteTarget, RetryPolicy, TransferError};
use climcomp::{
    Language, OutputFormat, PipelineConfig, RasterEngine, RasterError, Resampling, Symbology,
    TargetKind, Variant,
};
use image::{Rgba, RgbaImage};
use ndarray::Array2;

pub const SYMBOLOGY: &str = r#"
AWD:
  resampling: bilinear
  classes:
    - { low: -200, high: -60, color: [33, 102, 172] }
    - { low: -60, high: 0, color: [209, 229, 240] }
    - { low: 0, high: 60, color: [239, 138, 98] }
    - { low: 60, high: 200, color: [178, 24, 43] }
HI:
  classes:
    - { low: -.inf, high: 32, color: [254, 229, 217] }
    - { low: 32, high: 100, color: [203, 24, 29] }
"#;

// ============================================================================
// Raster engine
// ============================================================================

/// Serves rasters by file name; reprojection just relabels the CRS.
#[derive(Default)]
pub struct FakeEngine {
    rasters: HashMap<String, GeoRaster>,
    pub opens: AtomicU32,
}

impl FakeEngine {
    pub fn with(mut self, name: &str, raster: GeoRaster) -> Self {
        self.rasters.insert(name.to_string(), raster);
        self
    }
}

impl RasterEngine for FakeEngine {
    fn open(&self, path: &Path) -> Result<GeoRaster, RasterError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        self.rasters
            .get(name)
            .cloned()
            .ok_or_else(|| RasterError::UnsupportedFormat(format!("not a raster: {}", name)))
    }

    fn reproject(
        &self,
        raster: &GeoRaster,
        target_crs: &str,
        _resampling: Resampling,
    ) -> Result<GeoRaster, RasterError> {
        let mut out = raster.clone();
        out.projection = target_crs.to_string();
        Ok(out)
    }
}

/// 8x8 raster over [0, 8) x [0, 8) in EPSG:3857 filled with `value`.
pub fn uniform_raster(value: f64) -> GeoRaster {
    GeoRaster {
        data: Array2::from_elem((8, 8), value),
        geotransform: [0.0, 1.0, 0.0, 8.0, 0.0, -1.0],
        projection: "EPSG:3857".into(),
        nodata: Some(-999.0),
    }
}

// ============================================================================
// Templates and configuration
// ============================================================================

pub fn write_template(root: &Path, variant: Variant, language: Language, stem: &str) {
    let dir = root.join(variant.as_str()).join(language.as_str());
    std::fs::create_dir_all(&dir).unwrap();
    RgbaImage::from_pixel(12, 12, Rgba([250, 250, 250, 255]))
        .save(dir.join(format!("{}.png", stem)))
        .unwrap();
    let descriptor = TemplateDescriptor {
        projection: "EPSG:3857".into(),
        extent: [0.0, 0.0, 8.0, 8.0],
        frame: PixelRect {
            x: 2,
            y: 2,
            width: 8,
            height: 8,
        },
        reserved: vec![PixelRect {
            x: 8,
            y: 8,
            width: 2,
            height: 2,
        }],
    };
    std::fs::write(
        dir.join(SHARED_DESCRIPTOR),
        serde_json::to_string(&descriptor).unwrap(),
    )
    .unwrap();
}

/// Touch source files; content is irrelevant to `FakeEngine`.
pub fn write_sources(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, b"").unwrap();
            path
        })
        .collect()
}

pub fn config(root: &Path, languages: Vec<Language>, variants: Vec<Variant>) -> PipelineConfig {
    PipelineConfig {
        template_root: root.join("templates"),
        output_root: root.join("output"),
        output_format: OutputFormat::Png,
        jpeg_quality: 50,
        workers: 2,
        transfer_concurrency: 2,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_ms: 1,
            max_backoff_ms: 2,
        },
        remote_dir: "maps".into(),
        dated_remote_dirs: false,
        keep_days: None,
        languages,
        variants,
        parameters: Symbology::from_yaml_str(SYMBOLOGY).unwrap(),
    }
}

// ============================================================================
// Remote targets
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Accept,
    TimeOut,
    /// Time out this many times, then accept
    Flaky(u32),
    RejectLogin,
    RejectUpload,
}

/// Remote target whose connections follow a script and log every operation.
pub struct ScriptedTarget {
    kind: TargetKind,
    behaviour: Behaviour,
    atomic_rename: bool,
    listings: Arc<HashMap<String, Vec<RemoteEntry>>>,
    pub connects: AtomicU32,
    pub ops: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTarget {
    pub fn new(kind: TargetKind, behaviour: Behaviour) -> Self {
        Self {
            kind,
            behaviour,
            atomic_rename: true,
            listings: Arc::new(HashMap::new()),
            connects: AtomicU32::new(0),
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn without_rename(mut self) -> Self {
        self.atomic_rename = false;
        self
    }

    /// Directory contents served by `list`; unlisted directories are missing.
    /// Names ending in `/` are directories.
    pub fn with_listing(mut self, dir: &str, names: &[&str]) -> Self {
        let entries = names
            .iter()
            .map(|name| RemoteEntry {
                name: name.trim_end_matches('/').to_string(),
                is_dir: name.ends_with('/'),
            })
            .collect();
        Arc::make_mut(&mut self.listings).insert(dir.to_string(), entries);
        self
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

impl RemoteTarget for ScriptedTarget {
    fn kind(&self) -> TargetKind {
        self.kind
    }

    fn connect(&self) -> Result<Box<dyn RemoteSession>, TransferError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        match self.behaviour {
            Behaviour::TimeOut => Err(TransferError::ConnectionFailed("connect timed out".into())),
            Behaviour::Flaky(n) if attempt <= n => {
                Err(TransferError::ConnectionFailed("connect timed out".into()))
            }
            Behaviour::RejectLogin => Err(TransferError::AuthFailed("530 Login incorrect".into())),
            _ => Ok(Box::new(ScriptedSession {
                reject_upload: matches!(self.behaviour, Behaviour::RejectUpload),
                atomic_rename: self.atomic_rename,
                listings: self.listings.clone(),
                ops: self.ops.clone(),
            })),
        }
    }
}

struct ScriptedSession {
    reject_upload: bool,
    atomic_rename: bool,
    listings: Arc<HashMap<String, Vec<RemoteEntry>>>,
    ops: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSession {
    fn log(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

impl RemoteSession for ScriptedSession {
    fn ensure_dir(&mut self, path: &str) -> Result<(), TransferError> {
        self.log(format!("mkdir {}", path));
        Ok(())
    }

    fn put(&mut self, local: &Path, remote: &str) -> Result<(), TransferError> {
        if self.reject_upload {
            return Err(TransferError::RemoteRejected("553 Permission denied".into()));
        }
        assert!(local.is_file(), "uploading a missing file {:?}", local);
        self.log(format!("put {}", remote));
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), TransferError> {
        self.log(format!("rename {} {}", from, to));
        Ok(())
    }

    fn supports_atomic_rename(&self) -> bool {
        self.atomic_rename
    }

    fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        self.log(format!("list {}", dir));
        self.listings
            .get(dir)
            .cloned()
            .ok_or_else(|| TransferError::RemoteRejected(format!("550 {}: no such directory", dir)))
    }

    fn remove_file(&mut self, path: &str) -> Result<(), TransferError> {
        self.log(format!("rm {}", path));
        Ok(())
    }

    fn remove_dir(&mut self, path: &str) -> Result<(), TransferError> {
        self.log(format!("rmdir {}", path));
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), TransferError> {
        self.log("close".into());
        Ok(())
    }
}
