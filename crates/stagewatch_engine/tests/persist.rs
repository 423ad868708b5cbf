use std::fs;
use std::path::Path;

use stagewatch_engine::{ensure_output_dir, job_archive_dir, AtomicFileWriter, PersistError};
use tempfile::TempDir;

#[test]
fn output_dir_is_created_with_parents() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("runs").join("today");
    ensure_output_dir(&out).unwrap();
    assert!(out.is_dir());
    // Existing directories are fine.
    ensure_output_dir(&out).unwrap();
}

#[test]
fn output_dir_taken_by_a_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    let taken = temp.path().join("stagewatch-out");
    fs::write(&taken, "x").unwrap();

    let err = ensure_output_dir(&taken).unwrap_err();
    assert!(matches!(err, PersistError::NotADirectory(path) if path == taken));
}

#[test]
fn job_archive_is_replaced_in_place() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::for_job(temp.path(), "job-42");
    let job_dir = temp.path().join("job-42");

    let first = writer.write("generated-project.zip", b"first").unwrap();
    assert_eq!(first, job_dir.join("generated-project.zip"));

    let second = writer.write("generated-project.zip", b"second").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read(&second).unwrap(), b"second");
    assert_eq!(fs::read_dir(&job_dir).unwrap().count(), 1);
}

#[test]
fn failed_write_leaves_nothing_behind() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("job-7");
    fs::write(&blocker, "x").unwrap();

    let writer = AtomicFileWriter::for_job(temp.path(), "job-7");
    assert!(writer.write("generated-project.zip", b"data").is_err());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn job_directories_use_filename_safe_names() {
    let base = Path::new("out");
    assert_eq!(job_archive_dir(base, "3f2a-77_b"), base.join("3f2a-77_b"));
    assert_eq!(job_archive_dir(base, "../etc"), base.join("___etc"));
    assert_eq!(job_archive_dir(base, ""), base.join("job"));
}
