//! Catalog loading from files and directories, and progress persistence

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use coursemap::config::Settings;
use coursemap::domain::Resources;
use coursemap::infrastructure::di::ServiceContainer;
use coursemap::infrastructure::traits::{ProgressRepository, RealFileSystem, ResourceLedger};
use coursemap::infrastructure::{load_catalog, load_progress, InfraError};

const INTRO: &str = r#"
[[courses]]
id = "intro"
entry = "A"

[[courses.lessons]]
id = "A"
next = "B"

[[courses.branchings]]
id = "B"
content = { type = "one_from_n", next = ["C", "D"] }
prices = { D = { money = 5 } }

[[courses.lessons]]
id = "C"

[[courses.lessons]]
id = "D"
"#;

const ADVANCED: &str = r#"
[[courses]]
id = "advanced"
entry = "X"

[[courses.lessons]]
id = "X"
"#;

const PROGRESS: &str = r#"
[[profiles]]
id = "ann"
gender = "female"
laboratory = "chemistry"

[balances.ann]
energy = 3
money = 20
time = 1
"#;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn settings(data_dir: &Path) -> Settings {
    Settings {
        data_dir: data_dir.to_path_buf(),
        ..Settings::default()
    }
}

#[test]
fn given_catalog_directory_when_loading_then_merges_toml_files() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("intro.toml"), INTRO);
    write(&dir.path().join("more/advanced.toml"), ADVANCED);
    write(&dir.path().join("README.md"), "not a catalog");

    let catalog = load_catalog(&RealFileSystem, dir.path()).expect("load catalog");

    let ids: Vec<&str> = catalog.courses.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["intro", "advanced"]);
}

#[test]
fn given_duplicate_identity_across_files_when_loading_then_catalog_error() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("a.toml"), INTRO);
    write(&dir.path().join("b.toml"), INTRO);

    let err = load_catalog(&RealFileSystem, dir.path()).unwrap_err();

    match err {
        InfraError::Catalog { message, .. } => assert!(message.contains("duplicate identity")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn given_missing_path_when_loading_then_catalog_error() {
    let dir = TempDir::new().unwrap();

    let err = load_catalog(&RealFileSystem, &dir.path().join("nope")).unwrap_err();

    assert!(matches!(err, InfraError::Catalog { .. }));
}

#[test]
fn given_malformed_file_when_loading_then_names_the_file() {
    let dir = TempDir::new().unwrap();
    let bad = dir.path().join("bad.toml");
    write(&bad, "[[courses]]\nid = ");

    let err = load_catalog(&RealFileSystem, dir.path()).unwrap_err();

    match err {
        InfraError::Catalog { path, .. } => assert_eq!(path, bad),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn given_missing_progress_file_when_loading_then_empty_snapshot() {
    let dir = TempDir::new().unwrap();

    let snapshot = load_progress(&RealFileSystem, &dir.path().join("progress.toml")).unwrap();

    assert!(snapshot.profiles.is_empty());
    assert!(snapshot.choices.is_empty());
}

#[test]
fn given_choice_when_reloading_container_then_progress_persisted() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("catalog/intro.toml"), INTRO);
    write(&dir.path().join("progress.toml"), PROGRESS);

    let container = ServiceContainer::new(settings(dir.path())).expect("container");
    container
        .progress
        .choose("intro", "ann", "B", &["D".to_string()])
        .unwrap();
    container
        .progress
        .complete_lesson("intro", "ann", "A")
        .unwrap();
    drop(container);

    let reloaded = ServiceContainer::new(settings(dir.path())).expect("reload");

    let choice = reloaded.store.choice("ann", "B").expect("choice persisted");
    assert_eq!(choice.choice, "D");
    assert_eq!(reloaded.store.lessons_done("ann").len(), 1);
    assert_eq!(reloaded.store.balance("ann"), Resources::new(3, 15, 1));
    assert_eq!(reloaded.courses.active("intro", "ann").unwrap(), 2);
    assert!(!dir.path().join("progress.toml.tmp").exists());
}

#[test]
fn given_rejected_choice_when_reloading_then_snapshot_unchanged() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("catalog/intro.toml"), INTRO);
    write(&dir.path().join("progress.toml"), PROGRESS);

    let container = ServiceContainer::new(settings(dir.path())).unwrap();
    let err = container
        .progress
        .choose("intro", "ann", "B", &["C".to_string(), "D".to_string()])
        .unwrap_err();
    assert_eq!(err.code(), "wrong_choice_count");

    let on_disk = fs::read_to_string(dir.path().join("progress.toml")).unwrap();
    assert_eq!(on_disk, PROGRESS);
}

#[test]
fn given_snapshot_with_empty_choice_when_choosing_then_branching_unblocked() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("catalog/intro.toml"), INTRO);
    let progress = format!(
        r#"{PROGRESS}
[[choices]]
profile = "ann"
branching = "B"
choice = ""
chosen_at = "2024-03-01T09:30:00Z"
"#
    );
    write(&dir.path().join("progress.toml"), &progress);

    let container = ServiceContainer::new(settings(dir.path())).unwrap();
    let courses = &container.courses;
    assert_eq!(
        courses
            .map("intro", "ann")
            .unwrap()
            .iter()
            .map(|e| e.id().to_string())
            .collect::<Vec<_>>(),
        vec!["A", "B"]
    );

    container
        .progress
        .choose("intro", "ann", "B", &["C".to_string()])
        .expect("empty record does not block the branching");

    assert_eq!(container.store.choices("ann").len(), 1);
    assert_eq!(container.store.choice("ann", "B").unwrap().choice, "C");
    assert_eq!(courses.map("intro", "ann").unwrap().len(), 3);

    let reloaded = ServiceContainer::new(settings(dir.path())).unwrap();
    assert_eq!(reloaded.store.choice("ann", "B").unwrap().choice, "C");
}
