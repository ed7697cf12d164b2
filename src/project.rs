//! Project descriptor (`tiapp.xml`) reader
//!
//! Only the application id and guid are needed: the id names the app in
//! messages and the lock record, the guid is the handshake secret.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::{FastdevError, Result};

/// Descriptor file name inside the project directory
pub const DESCRIPTOR_FILE: &str = "tiapp.xml";

/// Identity of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub id: String,
    pub guid: String,
}

impl ProjectDescriptor {
    /// Path of the descriptor for a project directory
    pub fn path_for(project_dir: &Path) -> PathBuf {
        project_dir.join(DESCRIPTOR_FILE)
    }

    /// Whether `project_dir` contains a descriptor
    pub fn exists(project_dir: &Path) -> bool {
        Self::path_for(project_dir).is_file()
    }

    /// Load the descriptor of `project_dir`
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = Self::path_for(project_dir);
        if !path.is_file() {
            return Err(FastdevError::NotAProject {
                dir: project_dir.to_path_buf(),
            });
        }
        let xml = std::fs::read_to_string(&path)?;
        Self::parse(&xml).map_err(|message| FastdevError::Descriptor { path, message })
    }

    /// Parse descriptor XML
    pub fn parse(xml: &str) -> std::result::Result<Self, String> {
        let id = element_text(xml, "id")?;
        let guid = element_text(xml, "guid")?;
        Ok(Self { id, guid })
    }
}

/// Text of the first `<name>` element, entity-decoded and trimmed.
fn element_text(xml: &str, name: &str) -> std::result::Result<String, String> {
    let pattern = format!(r"(?s)<{name}(?:\s[^>]*)?>(.*?)</{name}\s*>");
    let re = Regex::new(&pattern).map_err(|e| e.to_string())?;

    let text = re
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| unescape(m.as_str().trim()))
        .ok_or_else(|| format!("missing <{}> element", name))?;

    if text.is_empty() {
        return Err(format!("empty <{}> element", name));
    }
    Ok(text)
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
