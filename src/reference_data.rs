// src/reference_data.rs
//
// Loading and formatting of the reference catalogs: the static lists of
// known-correct domain terms and people names. Read-only at run time; used
// as analyzer and summarizer context, never as a correction source directly.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A known term: either a bare string or a rich object with aliases and a
/// description. The shape is resolved here, at the file boundary, so the
/// rest of the code only ever matches on the enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermEntry {
    Simple(String),
    Rich(RichTerm),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RichTerm {
    pub term: String,
    #[serde(default)]
    pub acronyms: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub related_terms: Vec<String>,
}

/// A known person: bare name or rich object with nicknames and role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersonEntry {
    Simple(String),
    Rich(RichPerson),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RichPerson {
    pub name: String,
    #[serde(default)]
    pub nicknames: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermCatalog {
    #[serde(default)]
    pub terms: Vec<TermEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeopleCatalog {
    #[serde(default)]
    pub people: Vec<PersonEntry>,
}

/// Load the term catalog. A missing or malformed file yields an empty
/// catalog with a warning; the pipeline must keep going either way.
pub fn load_terms(path: &Path) -> TermCatalog {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<TermCatalog>(&contents) {
            Ok(catalog) => {
                info!("[ReferenceData] Loaded {} terms from {}", catalog.terms.len(), path.display());
                catalog
            }
            Err(e) => {
                warn!("[ReferenceData] Failed to parse terms file {}: {}", path.display(), e);
                TermCatalog::default()
            }
        },
        Err(e) => {
            warn!("[ReferenceData] Terms file not available at {}: {}", path.display(), e);
            TermCatalog::default()
        }
    }
}

/// Load the people catalog; same tolerance as [`load_terms`].
pub fn load_people(path: &Path) -> PeopleCatalog {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<PeopleCatalog>(&contents) {
            Ok(catalog) => {
                info!(
                    "[ReferenceData] Loaded {} people from {}",
                    catalog.people.len(),
                    path.display()
                );
                catalog
            }
            Err(e) => {
                warn!("[ReferenceData] Failed to parse people file {}: {}", path.display(), e);
                PeopleCatalog::default()
            }
        },
        Err(e) => {
            warn!("[ReferenceData] People file not available at {}: {}", path.display(), e);
            PeopleCatalog::default()
        }
    }
}

impl TermCatalog {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Expand every entry plus its acronyms into a flat deduplicated list.
    pub fn flatten(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for entry in &self.terms {
            match entry {
                TermEntry::Simple(term) => push_unique(&mut out, term),
                TermEntry::Rich(rich) => {
                    push_unique(&mut out, &rich.term);
                    for acronym in &rich.acronyms {
                        push_unique(&mut out, acronym);
                    }
                }
            }
        }
        out
    }

    /// Render the catalog as a compact reference block for LLM prompts.
    pub fn format_for_prompt(&self) -> String {
        if self.terms.is_empty() {
            return "No term data available.".to_string();
        }

        let mut text = String::from("## Terminology Reference\n\n");
        for entry in &self.terms {
            match entry {
                TermEntry::Simple(term) => {
                    text.push_str(&format!("**{}**\n\n", term));
                }
                TermEntry::Rich(rich) => {
                    text.push_str(&format!("### {}\n", rich.term));
                    if !rich.acronyms.is_empty() {
                        text.push_str(&format!(
                            "**Acronyms/Alternatives:** {}\n",
                            rich.acronyms.join(", ")
                        ));
                    }
                    if let Some(desc) = &rich.description {
                        text.push_str(&format!("**Description:** {}\n", desc));
                    }
                    if !rich.related_terms.is_empty() {
                        text.push_str(&format!("**Related Terms:** {}\n", rich.related_terms.join(", ")));
                    }
                    text.push('\n');
                }
            }
        }
        text
    }
}

impl PeopleCatalog {
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    /// Expand every entry plus its nicknames into a flat deduplicated list.
    pub fn flatten(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for entry in &self.people {
            match entry {
                PersonEntry::Simple(name) => push_unique(&mut out, name),
                PersonEntry::Rich(rich) => {
                    push_unique(&mut out, &rich.name);
                    for nickname in &rich.nicknames {
                        push_unique(&mut out, nickname);
                    }
                }
            }
        }
        out
    }

    /// Case-insensitive membership check against names and nicknames.
    /// The analyzer uses this to tag person corrections.
    pub fn is_known_name(&self, candidate: &str) -> bool {
        let lowered = candidate.trim().to_lowercase();
        if lowered.is_empty() {
            return false;
        }
        self.flatten().iter().any(|name| name.to_lowercase() == lowered)
    }

    pub fn format_for_prompt(&self) -> String {
        if self.people.is_empty() {
            return "No name data available.".to_string();
        }

        let mut text = String::from("## People Reference\n\n");
        for entry in &self.people {
            match entry {
                PersonEntry::Simple(name) => {
                    text.push_str(&format!("**{}**\n\n", name));
                }
                PersonEntry::Rich(rich) => {
                    text.push_str(&format!("### {}\n", rich.name));
                    if let Some(role) = &rich.role {
                        text.push_str(&format!("**Role:** {}\n", role));
                    }
                    if !rich.nicknames.is_empty() {
                        text.push_str(&format!("**Nicknames/Handles:** {}\n", rich.nicknames.join(", ")));
                    }
                    if let Some(desc) = &rich.description {
                        text.push_str(&format!("**Background:** {}\n", desc));
                    }
                    text.push('\n');
                }
            }
        }
        text
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return;
    }
    if !list.iter().any(|existing| existing == trimmed) {
        list.push(trimmed.to_string());
    }
}
