use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "isaref";
const ENV_PREFIX: &str = "ISAREF";

/// Everything the extractor needs to know about the reference document and
/// where to read/write it. Every field has a default matching the RDNA3 ISA
/// reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local path or http(s) URL; the CLI argument wins when given.
    pub source: Option<String>,
    pub output: PathBuf,
    pub layout: Layout,
    pub http: HttpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            source: None,
            output: PathBuf::from("ref.json"),
            layout: Layout::default(),
            http: HttpSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub fonts: Fonts,
    /// Zero-based index of the table-of-contents page.
    pub toc_page: usize,
    /// Printed page number + offset = page index.
    pub page_offset: usize,
    pub heading_marker: String,
    /// Max baseline drift (points) for two runs to share a line.
    pub line_tolerance: f32,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            fonts: Fonts::default(),
            toc_page: 8,
            page_offset: 8,
            heading_marker: "Instructions".to_string(),
            line_tolerance: 3.0,
        }
    }
}

/// Font identifiers as the PDF names them (subset tag included).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Fonts {
    pub name: String,
    pub desc: String,
    pub code: String,
    pub notes: String,
    pub italic: String,
}

impl Default for Fonts {
    fn default() -> Self {
        Fonts {
            name: "025510+SourceSerifPro-Bold".to_string(),
            desc: "0a6d0b+SourceSerifPro-Regular".to_string(),
            code: "c52825+RobotoMono-Regular".to_string(),
            notes: "025510+SourceSerifPro-Bold".to_string(),
            italic: "a75df5+SourceSerifPro-It".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            timeout_secs: 60,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
        }
    }
}

/// Layer defaults, then `isaref.toml` (or `file`), then `ISAREF_*` env vars.
pub fn load(file: Option<&Path>) -> Result<Settings> {
    let file_source = match file {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    Config::builder()
        .add_source(file_source)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_document() {
        let s = Settings::default();
        assert_eq!(s.layout.toc_page, 8);
        assert_eq!(s.layout.page_offset, 8);
        assert_eq!(s.layout.heading_marker, "Instructions");
        assert_eq!(s.layout.fonts.name, s.layout.fonts.notes);
        assert_eq!(s.output, PathBuf::from("ref.json"));
    }

    #[test]
    fn file_overrides_only_what_it_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.toml");
        std::fs::write(
            &path,
            "output = \"out/rdna.json\"\n[layout]\ntoc_page = 3\n[layout.fonts]\ncode = \"Mono\"\n",
        )
        .unwrap();

        let s = load(Some(&path)).unwrap();
        assert_eq!(s.output, PathBuf::from("out/rdna.json"));
        assert_eq!(s.layout.toc_page, 3);
        assert_eq!(s.layout.page_offset, 8);
        assert_eq!(s.layout.fonts.code, "Mono");
        assert_eq!(s.layout.fonts.desc, Fonts::default().desc);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
