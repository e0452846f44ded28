//! Shared types and enums used across climcomp.
//! Includes `Language`, `Variant`, `TemplateKey`, `OutputFormat`, `Resampling`
//! and `TargetKind`.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Languages a background template set is authored in.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cs,
    De,
    En,
    Hr,
    Pl,
    Sk,
    Sl,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::Cs,
        Language::De,
        Language::En,
        Language::Hr,
        Language::Pl,
        Language::Sk,
        Language::Sl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cs => "cs",
            Language::De => "de",
            Language::En => "en",
            Language::Hr => "hr",
            Language::Pl => "pl",
            Language::Sk => "sk",
            Language::Sl => "sl",
        }
    }

    /// Parse a directory or CLI token; exact lowercase match only.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == token)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Template style: full detail or simplified.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Normal,
    Reduced,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Normal, Variant::Reduced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Normal => "normal",
            Variant::Reduced => "reduced",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == token)
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies one background asset set.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TemplateKey {
    pub language: Language,
    pub variant: Variant,
}

impl TemplateKey {
    pub fn new(language: Language, variant: Variant) -> Self {
        Self { language, variant }
    }
}

impl std::fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.variant, self.language)
    }
}

#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Debug,
    Default,
    ValueEnum,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg, // Lossy, smaller uploads
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// Resampling used when aligning a source raster to a template grid.
/// `Nearest` suits categorical parameters, `Bilinear` continuous ones.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
}

impl Resampling {
    /// Name understood by `gdalwarp -r`.
    pub fn gdal_name(&self) -> &'static str {
        match self {
            Resampling::Nearest => "near",
            Resampling::Bilinear => "bilinear",
        }
    }
}

impl std::fmt::Display for Resampling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resampling::Nearest => write!(f, "nearest"),
            Resampling::Bilinear => write!(f, "bilinear"),
        }
    }
}

/// Remote publish targets.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Sftp,
    Ftp,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Sftp => write!(f, "SFTP"),
            TargetKind::Ftp => write!(f, "FTP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tokens_are_exact() {
        assert_eq!(Language::from_token("cs"), Some(Language::Cs));
        assert_eq!(Language::from_token("CS"), None);
        assert_eq!(Language::from_token("cz"), None);
        for lang in Language::ALL {
            assert_eq!(Language::from_token(lang.as_str()), Some(lang));
        }
    }

    #[test]
    fn template_key_display_matches_directory_layout() {
        let key = TemplateKey::new(Language::Sl, Variant::Reduced);
        assert_eq!(key.to_string(), "reduced/sl");
    }
}
