use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::fields::InstructionSpec;

/// One entry of the generated reference; the mnemonic is the map key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionDoc {
    pub desc: String,
    pub code: String,
    pub notes: String,
}

pub type Reference = BTreeMap<String, InstructionDoc>;

/// Markdown as shown in an editor hover.
impl fmt::Display for InstructionDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n```\n{}\n```\n", self.desc, self.code)?;
        if !self.notes.is_empty() {
            write!(f, "*Notes*\n{}", self.notes)?;
        }
        Ok(())
    }
}

pub struct Folded {
    pub reference: Reference,
    pub duplicates: usize,
}

/// Key records by mnemonic. A repeated mnemonic replaces the earlier entry.
pub fn fold(specs: Vec<InstructionSpec>) -> Folded {
    let mut reference = Reference::new();
    let mut duplicates = 0;
    for spec in specs {
        let doc = InstructionDoc {
            desc: spec.desc,
            code: spec.code,
            notes: spec.notes,
        };
        if reference.insert(spec.name.clone(), doc).is_some() {
            duplicates += 1;
            debug!(mnemonic = %spec.name, "Duplicate mnemonic, keeping the later entry");
        }
    }
    Folded {
        reference,
        duplicates,
    }
}

pub fn write(path: &Path, reference: &Reference, pretty: bool) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut out = BufWriter::new(file);
    if pretty {
        serde_json::to_writer_pretty(&mut out, reference)?;
    } else {
        serde_json::to_writer(&mut out, reference)?;
    }
    out.flush().with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Reference> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("{:?} is not an instruction reference", path))
}

pub fn lookup<'r>(reference: &'r Reference, mnemonic: &str) -> Option<&'r InstructionDoc> {
    reference.get(&mnemonic.to_lowercase())
}

/// Mnemonics starting with `prefix`, sorted.
pub fn complete<'r>(reference: &'r Reference, prefix: &str) -> Vec<&'r str> {
    let prefix = prefix.to_lowercase();
    reference
        .range(prefix.clone()..)
        .take_while(|(name, _)| name.starts_with(&prefix))
        .map(|(name, _)| name.as_str())
        .collect()
}
