use std::io::{Cursor, Read};

use pretty_assertions::assert_eq;
use stagewatch_core::FileMap;
use stagewatch_engine::{build_archive, plan_layout, ArchiveError, PlannedEntry, MANIFEST_NAME, README_NAME};
use zip::ZipArchive;

fn files(entries: &[(&str, &str)]) -> FileMap {
    entries
        .iter()
        .map(|(path, content)| (path.to_string(), content.to_string()))
        .collect()
}

fn read_entries(bytes: Vec<u8>) -> Vec<(String, String)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        entries.push((entry.name().to_string(), content));
    }
    entries
}

#[test]
fn archive_contains_every_file_once_in_section_folders() {
    let canonical = files(&[
        ("frontend/src/App.jsx", "export default App;"),
        ("backend/main.py", "print('hi')"),
        ("tester/test_main.py", "def test(): pass"),
        ("deployment/Dockerfile", "FROM python:3.12"),
        ("planner/architecture.md", "# Plan"),
        ("script1.py", "x = 1"),
    ]);

    let bytes = build_archive(&canonical, Some("# Generated project")).unwrap();
    let entries = read_entries(bytes);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            README_NAME,
            "Dockerfile",
            "backend/main.py",
            "docs/architecture.md",
            "frontend/src/App.jsx",
            "script1.py",
            "tests/test_main.py",
            MANIFEST_NAME,
        ]
    );
    assert_eq!(entries[0].1, "# Generated project");
    assert_eq!(entries[2].1, "print('hi')");
}

#[test]
fn manifest_lists_sources_sizes_and_digests() {
    let canonical = files(&[("backend/main.py", "abc")]);
    let entries = read_entries(build_archive(&canonical, None).unwrap());
    let (name, manifest) = entries.last().unwrap();
    assert_eq!(name, MANIFEST_NAME);

    let manifest: serde_json::Value = serde_json::from_str(manifest).unwrap();
    assert_eq!(manifest["file_count"], 1);
    assert_eq!(manifest["files"][0]["path"], "backend/main.py");
    assert_eq!(manifest["files"][0]["source"], "backend/main.py");
    assert_eq!(manifest["files"][0]["bytes"], 3);
    assert_eq!(
        manifest["files"][0]["sha256"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn empty_file_set_still_produces_a_manifest() {
    let entries = read_entries(build_archive(&FileMap::new(), None).unwrap());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, MANIFEST_NAME);
}

#[test]
fn relocated_file_falls_back_to_its_canonical_path() {
    // "deployment/Dockerfile" wants the root slot already held by "Dockerfile".
    let canonical = files(&[("Dockerfile", "FROM a"), ("deployment/Dockerfile", "FROM b")]);
    let plan = plan_layout(&canonical, &[MANIFEST_NAME]).unwrap();
    assert_eq!(
        plan,
        vec![
            PlannedEntry {
                archive_path: "Dockerfile".to_string(),
                source_path: "Dockerfile".to_string(),
            },
            PlannedEntry {
                archive_path: "deployment/Dockerfile".to_string(),
                source_path: "deployment/Dockerfile".to_string(),
            },
        ]
    );
}

#[test]
fn reserved_names_cannot_be_overwritten() {
    let canonical = files(&[("README.md", "from the job")]);
    let err = build_archive(&canonical, Some("# Generated project")).unwrap_err();
    assert!(matches!(err, ArchiveError::DuplicateEntry(path) if path == "README.md"));

    // Without a supplied README the job's own one is kept.
    let entries = read_entries(build_archive(&canonical, None).unwrap());
    assert_eq!(entries[0], ("README.md".to_string(), "from the job".to_string()));
}
