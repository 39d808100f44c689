//! Streaming lesson units in chunks and counting tasks

use std::sync::Arc;

use rstest::{fixture, rstest};

use coursemap::application::services::CourseService;
use coursemap::config::Settings;
use coursemap::infrastructure::di::ServiceContainer;
use coursemap::infrastructure::traits::RealFileSystem;
use coursemap::infrastructure::{Catalog, InMemoryStore};

const CATALOG: &str = r#"
[[courses]]
id = "onboarding"
entry = "talk"

[[courses.lessons]]
id = "talk"
next = "empty"
location = "classroom"
npc = "narrator"

[[courses.lessons.units]]
id = "u1"
type = "dialogue"
text = "Welcome to the lab."
next = ["u2"]
location = "lab"
npc = "mentor"

[[courses.lessons.units]]
id = "u2"
type = "theory"
title = "Safety"
text = "Goggles on."
next = ["u3"]

[[courses.lessons.units]]
id = "u3"
type = "reply"
text = "Understood."
next = ["u4"]

[[courses.lessons.units]]
id = "u4"
type = "dialogue"
text = "Pick your path."
next = ["u5", "u6"]

[[courses.lessons.units]]
id = "u5"
type = "button"
label = "Run the experiment"
next = ["u7"]

[[courses.lessons.units]]
id = "u6"
type = "dialogue"
text = "Let's read first."
next = ["u7"]

[[courses.lessons.units]]
id = "u7"
type = "task"
kind = "single_choice"
question = "Which flask?"
options = ["a", "b"]
answer = "b"
next = ["u8"]

[[courses.lessons.units]]
id = "u8"
type = "task"
kind = "text_answer"
question = "Describe the reaction."
next = ["u9"]

[[courses.lessons.units]]
id = "u9"
type = "dialogue"
text = "Well done."

[[courses.lessons]]
id = "empty"
"#;

#[fixture]
fn courses() -> Arc<CourseService> {
    let catalog = Catalog::parse(CATALOG).expect("parse catalog");
    let store = InMemoryStore::new(&catalog);
    ServiceContainer::with_store(Settings::default(), Arc::new(RealFileSystem), Arc::new(store))
        .courses
}

fn ids(units: &[serde_json::Value]) -> Vec<&str> {
    units.iter().filter_map(|u| u["id"].as_str()).collect()
}

#[rstest]
fn given_lesson_start_when_streaming_then_stops_before_reply(courses: Arc<CourseService>) {
    let chunk = courses.units("talk", None).unwrap();

    assert_eq!(ids(&chunk.units), vec!["u1", "u2"]);
    assert_eq!(chunk.last.as_deref(), Some("u2"));
    assert_eq!(chunk.location.as_deref(), Some("lab"));
    assert_eq!(chunk.npc.as_deref(), Some("mentor"));
    assert!(!chunk.finished);
}

#[rstest]
fn given_fork_ahead_when_streaming_then_bundles_alternatives(courses: Arc<CourseService>) {
    let chunk = courses.units("talk", Some("u2")).unwrap();

    assert_eq!(chunk.units.len(), 3);
    assert_eq!(ids(&chunk.units[..2]), vec!["u3", "u4"]);
    assert_eq!(chunk.units[2]["type"], "choice");
    let options = chunk.units[2]["options"].as_array().unwrap();
    assert_eq!(ids(options), vec!["u5", "u6"]);
    assert_eq!(chunk.last.as_deref(), Some("u4"));
    // first delivered unit sets nothing, so the lesson defaults apply
    assert_eq!(chunk.location.as_deref(), Some("classroom"));
    assert_eq!(chunk.npc.as_deref(), Some("narrator"));
}

#[rstest]
fn given_task_when_streaming_then_answer_is_hidden(courses: Arc<CourseService>) {
    let chunk = courses.units("talk", Some("u5")).unwrap();

    assert_eq!(ids(&chunk.units), vec!["u7"]);
    let task = &chunk.units[0];
    assert_eq!(task["type"], "task");
    assert_eq!(task["question"], "Which flask?");
    assert_eq!(task["options"].as_array().map(Vec::len), Some(2));
    assert!(task.get("answer").is_none());
}

#[rstest]
fn given_last_units_when_streaming_then_finished(courses: Arc<CourseService>) {
    let chunk = courses.units("talk", Some("u8")).unwrap();

    assert_eq!(ids(&chunk.units), vec!["u9"]);
    assert!(chunk.finished);
}

#[rstest]
#[case("talk", 2)]
#[case("empty", 0)]
fn given_lesson_when_counting_tasks_then_longest_path(
    courses: Arc<CourseService>,
    #[case] lesson: &str,
    #[case] expected: usize,
) {
    assert_eq!(courses.task_count(lesson).unwrap(), expected);
}

#[rstest]
fn given_lesson_without_units_when_streaming_then_empty(courses: Arc<CourseService>) {
    let chunk = courses.units("empty", None).unwrap();

    assert!(chunk.units.is_empty());
    assert!(chunk.finished);
}

#[rstest]
fn given_unknown_identities_when_streaming_then_errors(courses: Arc<CourseService>) {
    assert_eq!(
        courses.units("nope", None).unwrap_err().code(),
        "unknown_lesson"
    );

    let err = courses.units("talk", Some("u42")).unwrap_err();
    assert!(!err.is_business_rule());
}
