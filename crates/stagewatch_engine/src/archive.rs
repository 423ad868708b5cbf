//! Archive Builder: canonical files to a single zip blob with a fixed folder layout.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::{Cursor, Write};

use serde::Serialize;
use sha2::{Digest, Sha256};
use stagewatch_core::{resolve_stage, FileMap, Stage};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Deterministic name the archive is saved under.
pub const ARCHIVE_FILE_NAME: &str = "generated-project.zip";
pub const MANIFEST_NAME: &str = "manifest.json";
pub const README_NAME: &str = "README.md";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("two files map to archive entry {0}")]
    DuplicateEntry(String),
    #[error("could not save archive: {0}")]
    Persist(#[from] crate::PersistError),
    #[error("manifest encoding failed: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Where one canonical file lands inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub archive_path: String,
    pub source_path: String,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    file_count: usize,
    files: Vec<ManifestEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    path: &'a str,
    source: &'a str,
    bytes: usize,
    sha256: String,
}

/// Top-level archive folder for a canonical path, chosen from its first segment.
///
/// Deployment files go to the archive root; paths without a recognised
/// section prefix are kept as they are.
pub fn archive_path(canonical: &str) -> String {
    let clean = sanitize_entry_path(canonical);
    let Some((head, rest)) = clean.split_once('/') else {
        return clean;
    };
    match resolve_stage(head) {
        Some(Stage::Frontend) => format!("frontend/{rest}"),
        Some(Stage::Backend) => format!("backend/{rest}"),
        Some(Stage::Testing) => format!("tests/{rest}"),
        Some(Stage::Planning) => format!("docs/{rest}"),
        Some(Stage::Deployment) => rest.to_string(),
        None => clean,
    }
}

/// Plans every archive entry. Files whose preferred location is taken keep
/// their canonical path; if that is taken too the plan fails.
pub fn plan_layout(files: &FileMap, reserved: &[&str]) -> Result<Vec<PlannedEntry>, ArchiveError> {
    let mut used: BTreeSet<String> = reserved.iter().map(|name| name.to_string()).collect();
    let preferred: Vec<(String, &String)> = files.keys().map(|path| (archive_path(path), path)).collect();

    // Files that stay put claim their names before relocated files do.
    let (staying, moving): (Vec<_>, Vec<_>) = preferred
        .into_iter()
        .partition(|(target, source)| *target == sanitize_entry_path(source));

    let mut plan = Vec::with_capacity(files.len());
    for (target, source) in staying.into_iter().chain(moving) {
        let fallback = sanitize_entry_path(source);
        let archive_path = if !used.contains(&target) {
            target
        } else if !used.contains(&fallback) {
            fallback
        } else {
            return Err(ArchiveError::DuplicateEntry(source.clone()));
        };
        used.insert(archive_path.clone());
        plan.push(PlannedEntry {
            archive_path,
            source_path: source.clone(),
        });
    }
    plan.sort_by(|a, b| a.archive_path.cmp(&b.archive_path));
    Ok(plan)
}

/// Builds the zip: every canonical file exactly once, an optional README at the
/// root, and a manifest listing each entry with its SHA-256.
pub fn build_archive(files: &FileMap, readme: Option<&str>) -> Result<Vec<u8>, ArchiveError> {
    let mut reserved = vec![MANIFEST_NAME];
    if readme.is_some() {
        reserved.push(README_NAME);
    }
    let plan = plan_layout(files, &reserved)?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut manifest = Manifest {
        file_count: plan.len(),
        files: Vec::with_capacity(plan.len()),
    };

    if let Some(readme) = readme {
        zip.start_file(README_NAME, options)?;
        zip.write_all(readme.as_bytes())?;
    }
    for entry in &plan {
        let Some(content) = files.get(&entry.source_path) else {
            continue;
        };
        zip.start_file(entry.archive_path.as_str(), options)?;
        zip.write_all(content.as_bytes())?;
        manifest.files.push(ManifestEntry {
            path: &entry.archive_path,
            source: &entry.source_path,
            bytes: content.len(),
            sha256: sha256_hex(content.as_bytes()),
        });
    }

    let manifest_json = serde_json::to_vec_pretty(&manifest)?;
    zip.start_file(MANIFEST_NAME, options)?;
    zip.write_all(&manifest_json)?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// Relative, slash-separated entry name with no `.`/`..` segments or characters zip tools reject.
fn sanitize_entry_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(|segment| {
            segment
                .chars()
                .map(|c| if is_forbidden(c) { '_' } else { c })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_forbidden(c: char) -> bool {
    matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}')
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(64);
    for byte in digest.iter() {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_prefixes_map_to_fixed_folders() {
        assert_eq!(archive_path("frontend/src/App.jsx"), "frontend/src/App.jsx");
        assert_eq!(archive_path("tester/script1.py"), "tests/script1.py");
        assert_eq!(archive_path("deployment/Dockerfile"), "Dockerfile");
        assert_eq!(archive_path("planner/architecture.md"), "docs/architecture.md");
        assert_eq!(archive_path("script1.py"), "script1.py");
        assert_eq!(archive_path("task_1/notes.md"), "task_1/notes.md");
    }

    #[test]
    fn entry_paths_cannot_escape_the_archive() {
        assert_eq!(sanitize_entry_path("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_entry_path("/abs/./file?.txt"), "abs/file_.txt");
        assert_eq!(sanitize_entry_path("win\\style\\path.cs"), "win/style/path.cs");
    }

    #[test]
    fn sha256_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
