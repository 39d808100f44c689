//! Tests for ProgressService: validation before mutation, atomic debit

use std::sync::Arc;

use rstest::{fixture, rstest};

use coursemap::application::ApplicationError;
use coursemap::config::Settings;
use coursemap::domain::{Gender, Profile, Resources};
use coursemap::infrastructure::di::ServiceContainer;
use coursemap::infrastructure::traits::{ProgressRepository, RealFileSystem, ResourceLedger};
use coursemap::infrastructure::{Catalog, InMemoryStore};

const CATALOG: &str = r#"
[[courses]]
id = "intro"
entry = "A"

[[courses.lessons]]
id = "A"
next = "B"
cost = { energy = 1 }

[[courses.lessons]]
id = "C"

[[courses.lessons]]
id = "D"

[[courses.branchings]]
id = "B"
content = { type = "one_from_n", next = ["C", "D"] }
prices = { D = { money = 50 } }

[[courses]]
id = "elective"
entry = "S"

[[courses.branchings]]
id = "S"
content = { type = "six_from_n", next = ["E1", "E2", "E3", "E4", "QX"] }
next = "F"
prices = { E1 = { money = 10 }, QX = { money = 30, time = 2 } }

[[courses.lessons]]
id = "E1"

[[courses.lessons]]
id = "E2"

[[courses.lessons]]
id = "E3"

[[courses.lessons]]
id = "E4"

[[courses.lessons]]
id = "F"

[[courses.quests]]
id = "QX"
entry = "X1"

[[courses.quests.lessons]]
id = "X1"
next = "X2"

[[courses.quests.lessons]]
id = "X2"
next = "X3"

[[courses.quests.lessons]]
id = "X3"

[[courses]]
id = "gendered"
entry = "P"

[[courses.branchings]]
id = "P"
content = { type = "profile_parameter", parameter = 2, next = { male = "G1", female = "G1" } }

[[courses.lessons]]
id = "G1"
"#;

struct Harness {
    store: Arc<InMemoryStore>,
    container: ServiceContainer,
}

#[fixture]
fn harness() -> Harness {
    let catalog = Catalog::parse(CATALOG).expect("parse catalog");
    let store = Arc::new(InMemoryStore::new(&catalog));
    store.add_profile(
        Profile {
            id: "ann".into(),
            gender: Gender::Female,
            laboratory: "chemistry".into(),
            university_position: Some("student".into()),
        },
        Resources::new(1, 60, 2),
    );
    let container =
        ServiceContainer::with_store(Settings::default(), Arc::new(RealFileSystem), store.clone());
    Harness { store, container }
}

fn strings(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[rstest]
fn given_priced_candidate_when_choosing_then_records_and_debits(harness: Harness) {
    let choice = harness
        .container
        .progress
        .choose("intro", "ann", "B", &strings(&["D"]))
        .unwrap();

    assert_eq!(choice.choice, "D");
    assert_eq!(harness.store.choice("ann", "B"), Some(choice));
    assert_eq!(harness.store.balance("ann"), Resources::new(1, 10, 2));
}

#[rstest]
fn given_existing_choice_when_choosing_again_then_rejected_and_unchanged(harness: Harness) {
    let progress = &harness.container.progress;
    let first = progress
        .choose("intro", "ann", "B", &strings(&["C"]))
        .unwrap();

    let err = progress
        .choose("intro", "ann", "B", &strings(&["D"]))
        .unwrap_err();

    assert!(matches!(err, ApplicationError::AlreadyChosen(_)));
    assert_eq!(err.code(), "already_chosen");
    assert_eq!(harness.store.choice("ann", "B"), Some(first));
    assert_eq!(harness.store.balance("ann"), Resources::new(1, 60, 2));
}

#[rstest]
#[case(&["E1", "E2"], 2)]
#[case(&["E1", "E2", "E3", "E4"], 4)]
#[case(&["E1", "E2", "QX", "E3", "E4"], 7)]
fn given_six_from_n_with_wrong_sum_when_choosing_then_rejected_without_debit(
    harness: Harness,
    #[case] picked: &[&str],
    #[case] actual: usize,
) {
    let err = harness
        .container
        .progress
        .choose("elective", "ann", "S", &strings(picked))
        .unwrap_err();

    match err {
        ApplicationError::WrongChoiceCount {
            expected, actual: got, ..
        } => {
            assert_eq!(expected, 6);
            assert_eq!(got, actual);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(harness.store.choice("ann", "S").is_none());
    assert_eq!(harness.store.balance("ann"), Resources::new(1, 60, 2));
}

#[rstest]
fn given_six_from_n_with_quest_when_choosing_then_quest_counts_its_lessons(harness: Harness) {
    harness
        .container
        .progress
        .choose("elective", "ann", "S", &strings(&["QX", "E1", "E2", "E3"]))
        .unwrap();

    assert_eq!(harness.store.balance("ann"), Resources::new(1, 20, 0));
}

#[rstest]
fn given_unaffordable_price_when_choosing_then_insufficient_and_nothing_recorded(
    harness: Harness,
) {
    harness.store.add_profile(
        Profile {
            id: "poor".into(),
            gender: Gender::Male,
            laboratory: "physics".into(),
            university_position: None,
        },
        Resources::new(0, 49, 0),
    );

    let err = harness
        .container
        .progress
        .choose("intro", "poor", "B", &strings(&["D"]))
        .unwrap_err();

    assert_eq!(err.code(), "insufficient_resources");
    assert!(err.is_business_rule());
    assert!(harness.store.choice("poor", "B").is_none());
    assert_eq!(harness.store.balance("poor"), Resources::new(0, 49, 0));
}

#[rstest]
#[case(&[], "invalid_choice")]
#[case(&["C", "C"], "invalid_choice")]
#[case(&["Z"], "invalid_choice")]
#[case(&["C", "D"], "wrong_choice_count")]
fn given_bad_identities_when_choosing_then_rejected(
    harness: Harness,
    #[case] picked: &[&str],
    #[case] code: &str,
) {
    let err = harness
        .container
        .progress
        .choose("intro", "ann", "B", &strings(picked))
        .unwrap_err();

    assert_eq!(err.code(), code);
    assert!(harness.store.choices("ann").is_empty());
}

#[rstest]
fn given_profile_parameter_branching_when_choosing_then_not_choosable(harness: Harness) {
    let err = harness
        .container
        .progress
        .choose("gendered", "ann", "P", &strings(&["G1"]))
        .unwrap_err();

    assert_eq!(err.code(), "not_choosable");
}

#[rstest]
fn given_branching_outside_map_when_choosing_then_not_reached(harness: Harness) {
    let err = harness
        .container
        .progress
        .choose("intro", "ann", "S", &strings(&["E1"]))
        .unwrap_err();

    assert_eq!(err.code(), "not_reached");
}

#[rstest]
fn given_reached_lesson_when_completing_then_recorded_and_cost_debited(harness: Harness) {
    let done = harness
        .container
        .progress
        .complete_lesson("intro", "ann", "A")
        .unwrap();

    assert_eq!(done.lesson, "A");
    assert_eq!(harness.store.lessons_done("ann").len(), 1);
    assert_eq!(harness.store.balance("ann"), Resources::new(0, 60, 2));
}

#[rstest]
fn given_completed_lesson_when_completing_again_then_already_completed(harness: Harness) {
    let progress = &harness.container.progress;
    progress.complete_lesson("intro", "ann", "A").unwrap();

    let err = progress.complete_lesson("intro", "ann", "A").unwrap_err();

    assert_eq!(err.code(), "already_completed");
    assert_eq!(harness.store.lessons_done("ann").len(), 1);
}

#[rstest]
fn given_lesson_behind_frontier_when_completing_then_not_reached(harness: Harness) {
    let err = harness
        .container
        .progress
        .complete_lesson("intro", "ann", "C")
        .unwrap_err();

    assert_eq!(err.code(), "not_reached");
}

#[rstest]
fn given_lesson_past_active_when_completing_then_not_reached(harness: Harness) {
    let progress = &harness.container.progress;
    progress
        .choose("intro", "ann", "B", &strings(&["C"]))
        .unwrap();

    // A is still open, so C lies beyond the active index
    let err = progress.complete_lesson("intro", "ann", "C").unwrap_err();

    assert_eq!(err.code(), "not_reached");
}

#[rstest]
fn given_no_energy_when_completing_then_insufficient(harness: Harness) {
    harness.store.add_profile(
        Profile {
            id: "tired".into(),
            gender: Gender::Male,
            laboratory: "physics".into(),
            university_position: None,
        },
        Resources::ZERO,
    );

    let err = harness
        .container
        .progress
        .complete_lesson("intro", "tired", "A")
        .unwrap_err();

    assert_eq!(err.code(), "insufficient_resources");
    assert!(harness.store.lessons_done("tired").is_empty());
}
