//! Source raster filename grammar.
//!
//! Source rasters (and the background templates that belong to them) are named
//! `bg_<PARAM>[_<low>-<high>cm]`, optionally with a `.tif`/`.tiff` extension.
//! `<PARAM>` is one or more `_`-separated alphanumeric segments (`AWD`, `FWI_GenZ`)
//! and the optional depth suffix is an integer soil-depth interval with `low < high`.
//!
//! Parsing is grammar-only: whether a code has a display convention is decided
//! later against the symbology catalog.
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub const SOURCE_PREFIX: &str = "bg_";

static GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^bg_(?P<code>[A-Za-z0-9]+(?:_[A-Za-z0-9]+)*?)(?:_(?P<low>\d+)-(?P<high>\d+)cm)?$")
        .expect("filename grammar is a valid regex")
});

static DEPTH_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-|\dcm$").expect("depth pattern is a valid regex"));

static DEPTH_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+-\d+cm$").expect("depth suffix is a valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ParseError {
    #[error("malformed raster name '{name}': expected bg_<PARAM>[_<low>-<high>cm]")]
    MalformedName { name: String },
    #[error("unrecognized depth suffix '{suffix}' in '{name}': expected <low>-<high>cm with low < high")]
    UnknownDepthFormat { name: String, suffix: String },
    #[error("empty parameter code in '{name}'")]
    EmptyCode { name: String },
}

impl ParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::MalformedName { .. } => "MalformedName",
            ParseError::UnknownDepthFormat { .. } => "UnknownDepthFormat",
            ParseError::EmptyCode { .. } => "EmptyCode",
        }
    }
}

/// Soil-depth interval in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DepthRange {
    pub low_cm: u32,
    pub high_cm: u32,
}

impl std::fmt::Display for DepthRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}cm", self.low_cm, self.high_cm)
    }
}

/// Identity of one source raster, parsed from its filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ParameterIdentity {
    pub code: String,
    pub depth: Option<DepthRange>,
    pub raw_name: String,
}

impl ParameterIdentity {
    /// `<code>[_<low>-<high>cm]`, used for output file names.
    pub fn output_stem(&self) -> String {
        match self.depth {
            Some(depth) => format!("{}_{}", self.code, depth),
            None => self.code.clone(),
        }
    }

    /// `bg_<code>[_<low>-<high>cm]`, shared by the source and its template files.
    pub fn canonical_stem(&self) -> String {
        format!("{}{}", SOURCE_PREFIX, self.output_stem())
    }
}

impl std::fmt::Display for ParameterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output_stem())
    }
}

/// Parse a source raster filename (a bare name or a path) into its identity.
pub fn parse(filename: &str) -> Result<ParameterIdentity, ParseError> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    let malformed = || ParseError::MalformedName {
        name: name.to_string(),
    };

    let stem = strip_raster_extension(name).ok_or_else(malformed)?;

    if let Some(caps) = GRAMMAR.captures(stem) {
        let code = caps["code"].to_string();
        let depth = match (caps.name("low"), caps.name("high")) {
            (Some(low), Some(high)) => {
                let suffix = format!("{}-{}cm", low.as_str(), high.as_str());
                let unknown = || ParseError::UnknownDepthFormat {
                    name: name.to_string(),
                    suffix: suffix.clone(),
                };
                let low_cm: u32 = low.as_str().parse().map_err(|_| unknown())?;
                let high_cm: u32 = high.as_str().parse().map_err(|_| unknown())?;
                if low_cm >= high_cm {
                    return Err(unknown());
                }
                Some(DepthRange { low_cm, high_cm })
            }
            // `bg_AWD_40cm` fits the code pattern but is a broken depth suffix
            _ if code.rsplit('_').next().is_some_and(|last| DEPTH_LIKE.is_match(last)) => {
                return Err(diagnose(name, stem));
            }
            _ => None,
        };
        return Ok(ParameterIdentity {
            code,
            depth,
            raw_name: name.to_string(),
        });
    }

    Err(diagnose(name, stem))
}

/// Pick the documented error kind for a stem the grammar rejected.
fn diagnose(name: &str, stem: &str) -> ParseError {
    let Some(rest) = stem.strip_prefix(SOURCE_PREFIX) else {
        return ParseError::MalformedName {
            name: name.to_string(),
        };
    };
    if rest.is_empty() {
        return ParseError::EmptyCode {
            name: name.to_string(),
        };
    }

    let mut segments: Vec<&str> = rest.split('_').collect();
    let last = segments[segments.len() - 1];
    // A lone segment is the code itself unless it is a bare depth suffix
    let depth_like =
        DEPTH_LIKE.is_match(last) && (segments.len() > 1 || DEPTH_SUFFIX.is_match(last));
    if depth_like {
        segments.pop();
    }
    if segments.iter().all(|s| s.is_empty()) {
        return ParseError::EmptyCode {
            name: name.to_string(),
        };
    }
    if depth_like {
        return ParseError::UnknownDepthFormat {
            name: name.to_string(),
            suffix: last.to_string(),
        };
    }
    ParseError::MalformedName {
        name: name.to_string(),
    }
}

fn strip_raster_extension(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        None => Some(name),
        Some((stem, ext))
            if ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff") =>
        {
            Some(stem)
        }
        Some(_) => None,
    }
}
