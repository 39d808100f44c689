//! Course read surface
//!
//! Builds a fresh `CourseTree` per request, so every call observes the
//! progress committed before it.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use termtree::Tree;
use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{
    Branching, ContentNode, Course, CourseTree, DomainResult, Lesson, LessonUnitTree, MapEntry,
    Profile, ProfileBranchingChoice, Resources, Scope, TraversalOptions, TraversalSource,
    TreeNodeConvert, UnitChunk,
};
use crate::infrastructure::traits::{
    ContentRepository, ProfileRepository, ProgressRepository, ResourceLedger,
};

/// Adapts the repositories to what the traversal reads.
pub struct RepositorySource<'a> {
    content: &'a dyn ContentRepository,
    progress: &'a dyn ProgressRepository,
}

impl<'a> RepositorySource<'a> {
    pub fn new(content: &'a dyn ContentRepository, progress: &'a dyn ProgressRepository) -> Self {
        Self { content, progress }
    }
}

impl TraversalSource for RepositorySource<'_> {
    fn find(&self, scope: &Scope, id: &str) -> Option<ContentNode> {
        self.content.find(scope, id)
    }

    fn choice(&self, profile: &str, branching: &str) -> Option<ProfileBranchingChoice> {
        self.progress.choice(profile, branching)
    }

    fn interacted(&self, profile: &str) -> HashSet<String> {
        let done = self
            .progress
            .lessons_done(profile)
            .into_iter()
            .map(|d| d.lesson);
        let chosen = self
            .progress
            .choices(profile)
            .into_iter()
            .filter(|c| !c.is_empty())
            .map(|c| c.branching);
        done.chain(chosen).collect()
    }
}

/// Progress summary of one profile in one course.
#[derive(Debug, Clone, Serialize)]
pub struct CourseStatus {
    pub course: String,
    pub profile: String,
    pub map: Vec<String>,
    pub active: usize,
    pub max_depth: usize,
    pub balance: Resources,
}

/// Service answering map, position and lesson content queries.
pub struct CourseService {
    content: Arc<dyn ContentRepository>,
    profiles: Arc<dyn ProfileRepository>,
    progress: Arc<dyn ProgressRepository>,
    ledger: Arc<dyn ResourceLedger>,
    options: TraversalOptions,
}

impl CourseService {
    pub fn new(
        content: Arc<dyn ContentRepository>,
        profiles: Arc<dyn ProfileRepository>,
        progress: Arc<dyn ProgressRepository>,
        ledger: Arc<dyn ResourceLedger>,
        options: TraversalOptions,
    ) -> Self {
        Self {
            content,
            profiles,
            progress,
            ledger,
            options,
        }
    }

    pub fn profile(&self, id: &str) -> ApplicationResult<Profile> {
        self.profiles
            .profile(id)
            .ok_or_else(|| ApplicationError::UnknownProfile(id.to_string()))
    }

    pub fn course(&self, id: &str) -> ApplicationResult<Arc<Course>> {
        self.content
            .course(id)
            .ok_or_else(|| ApplicationError::UnknownCourse(id.to_string()))
    }

    pub fn courses(&self) -> Vec<Arc<Course>> {
        self.content.courses()
    }

    pub fn find_lesson(&self, id: &str) -> Option<Arc<Lesson>> {
        self.content.find_lesson(id)
    }

    pub fn find_branching(&self, id: &str) -> Option<Arc<Branching>> {
        self.content.find_branching(id)
    }

    pub fn balance(&self, profile: &str) -> Resources {
        self.ledger.balance(profile)
    }

    /// Run `f` against a freshly built tree of `course_id`.
    pub fn with_tree<T>(
        &self,
        course_id: &str,
        f: impl FnOnce(&CourseTree<'_>) -> ApplicationResult<T>,
    ) -> ApplicationResult<T> {
        let course = self.course(course_id)?;
        let source = RepositorySource::new(self.content.as_ref(), self.progress.as_ref());
        let tree = CourseTree::new(
            Scope::Course(course.id.clone()),
            course.entry.as_deref(),
            &source,
            self.options,
        )?;
        f(&tree)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn map(&self, course_id: &str, profile_id: &str) -> ApplicationResult<Vec<MapEntry>> {
        let profile = self.profile(profile_id)?;
        self.with_tree(course_id, |tree| {
            Ok(tree.get_map_for_profile(&profile)?.to_vec())
        })
    }

    pub fn active(&self, course_id: &str, profile_id: &str) -> ApplicationResult<usize> {
        let profile = self.profile(profile_id)?;
        self.with_tree(course_id, |tree| Ok(tree.get_active(&profile)?))
    }

    /// Map and active index read from one tree.
    pub fn map_with_active(
        &self,
        course_id: &str,
        profile_id: &str,
    ) -> ApplicationResult<(Vec<MapEntry>, usize)> {
        let profile = self.profile(profile_id)?;
        self.with_tree(course_id, |tree| {
            let map = tree.get_map_for_profile(&profile)?.to_vec();
            Ok((map, tree.get_active(&profile)?))
        })
    }

    pub fn max_depth(&self, course_id: &str) -> ApplicationResult<usize> {
        self.with_tree(course_id, |tree| Ok(tree.get_max_depth()?))
    }

    pub fn lesson_number(
        &self,
        course_id: &str,
        profile_id: &str,
        lesson_id: &str,
    ) -> ApplicationResult<Option<usize>> {
        let profile = self.profile(profile_id)?;
        self.require_lesson(lesson_id)?;
        self.with_tree(course_id, |tree| {
            Ok(tree.get_lesson_number(&profile, lesson_id)?)
        })
    }

    pub fn quest_number(
        &self,
        course_id: &str,
        profile_id: &str,
        lesson_id: &str,
    ) -> ApplicationResult<Option<usize>> {
        let profile = self.profile(profile_id)?;
        self.require_lesson(lesson_id)?;
        self.with_tree(course_id, |tree| {
            Ok(tree.get_quest_number(&profile, lesson_id)?)
        })
    }

    fn require_lesson(&self, lesson_id: &str) -> ApplicationResult<()> {
        self.lesson(lesson_id).map(|_| ())
    }

    fn lesson(&self, lesson_id: &str) -> ApplicationResult<Arc<Lesson>> {
        self.content
            .find_lesson(lesson_id)
            .ok_or_else(|| ApplicationError::UnknownLesson(lesson_id.to_string()))
    }

    /// Next chunk of a lesson's units after `from` (or from its entry unit).
    #[instrument(level = "debug", skip(self))]
    pub fn units(&self, lesson_id: &str, from: Option<&str>) -> ApplicationResult<UnitChunk> {
        let lesson = self.lesson(lesson_id)?;
        let tree = LessonUnitTree::new(&lesson)?;
        let chunk = tree.next_chunk(from)?;
        debug!(
            "{lesson_id}: chunk of {} of {} unit(s)",
            chunk.units.len(),
            tree.len()
        );
        Ok(chunk)
    }

    pub fn task_count(&self, lesson_id: &str) -> ApplicationResult<usize> {
        let lesson = self.lesson(lesson_id)?;
        Ok(LessonUnitTree::new(&lesson)?.task_count())
    }

    /// Printable content graph of a course, with quests expanded in place.
    pub fn graph(&self, course_id: &str) -> ApplicationResult<Tree<String>> {
        self.with_tree(course_id, |tree| Ok(render(tree)?))
    }

    pub fn status(&self, course_id: &str, profile_id: &str) -> ApplicationResult<CourseStatus> {
        let profile = self.profile(profile_id)?;
        self.with_tree(course_id, |tree| {
            let map = tree.get_map_for_profile(&profile)?;
            Ok(CourseStatus {
                course: course_id.to_string(),
                profile: profile.id.clone(),
                map: map.iter().map(|e| e.id().to_string()).collect(),
                active: tree.get_active(&profile)?,
                max_depth: tree.get_max_depth()?,
                balance: self.ledger.balance(&profile.id),
            })
        })
    }
}

fn render(tree: &CourseTree<'_>) -> DomainResult<Tree<String>> {
    let Some(graph) = tree.graph() else {
        return Ok(Tree::new(format!("{} (empty)", tree.scope())));
    };
    let mut root = Tree::new(tree.scope().to_string());
    root.push(graph.to_tree_string());

    for (_, node) in graph.iter() {
        if let Some(quest) = node.data.as_quest() {
            let sub = tree.quest_tree(quest)?;
            root.push(render(&sub)?);
        }
    }
    Ok(root)
}
