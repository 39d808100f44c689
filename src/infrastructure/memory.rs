//! In-memory store implementing every persistence port.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, instrument};

use crate::domain::{
    Branching, ContentNode, Course, Lesson, Profile, ProfileBranchingChoice, ProfileLessonDone,
    Quest, Resources, Scope,
};
use crate::infrastructure::catalog::{Catalog, ProgressSnapshot, SnapshotFile};
use crate::infrastructure::traits::{
    CommitError, ContentRepository, ProfileRepository, ProgressBatch, ProgressRepository,
    ResourceLedger,
};

/// Content indexed by scope and identity.
#[derive(Default)]
struct ContentIndex {
    courses: BTreeMap<String, Arc<Course>>,
    scopes: HashMap<Scope, HashMap<String, ContentNode>>,
    lessons: HashMap<String, Arc<Lesson>>,
    branchings: HashMap<String, Arc<Branching>>,
}

impl ContentIndex {
    fn build(catalog: &Catalog) -> Self {
        let mut index = Self::default();
        for course in &catalog.courses {
            index
                .courses
                .insert(course.id.clone(), Arc::new(course.clone()));
            index.add_scope(
                Scope::Course(course.id.clone()),
                &course.lessons,
                &course.quests,
                &course.branchings,
                None,
            );
        }
        index
    }

    fn add_scope(
        &mut self,
        scope: Scope,
        lessons: &[Lesson],
        quests: &[Quest],
        branchings: &[Branching],
        quest: Option<&str>,
    ) {
        let mut nodes = HashMap::new();

        for lesson in lessons {
            let mut lesson = lesson.clone();
            if lesson.quest.is_none() {
                lesson.quest = quest.map(String::from);
            }
            let lesson = Arc::new(lesson);
            self.lessons.insert(lesson.id.clone(), Arc::clone(&lesson));
            nodes.insert(lesson.id.clone(), ContentNode::Lesson(lesson));
        }
        for branching in branchings {
            let branching = Arc::new(branching.clone());
            self.branchings
                .insert(branching.id.clone(), Arc::clone(&branching));
            nodes.insert(branching.id.clone(), ContentNode::Branching(branching));
        }
        for child in quests {
            nodes.insert(child.id.clone(), ContentNode::Quest(Arc::new(child.clone())));
            self.add_scope(
                Scope::Quest(child.id.clone()),
                &child.lessons,
                &child.quests,
                &child.branchings,
                Some(&child.id),
            );
        }

        self.scopes.insert(scope, nodes);
    }
}

/// Store holding content and progress in memory, optionally mirroring
/// progress to a snapshot file.
pub struct InMemoryStore {
    content: ContentIndex,
    state: RwLock<ProgressSnapshot>,
    sink: Option<SnapshotFile>,
}

impl InMemoryStore {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            content: ContentIndex::build(catalog),
            state: RwLock::new(ProgressSnapshot::default()),
            sink: None,
        }
    }

    pub fn with_progress(self, snapshot: ProgressSnapshot) -> Self {
        *self.write() = snapshot;
        self
    }

    /// Rewrite `sink` after every commit; a failed write aborts the commit.
    pub fn persist_to(mut self, sink: SnapshotFile) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Register a profile with a starting balance.
    pub fn add_profile(&self, profile: Profile, balance: Resources) {
        let mut state = self.write();
        state.balances.insert(profile.id.clone(), balance);
        state.profiles.retain(|p| p.id != profile.id);
        state.profiles.push(profile);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, ProgressSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProgressSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ContentRepository for InMemoryStore {
    fn course(&self, id: &str) -> Option<Arc<Course>> {
        self.content.courses.get(id).cloned()
    }

    fn courses(&self) -> Vec<Arc<Course>> {
        self.content.courses.values().cloned().collect()
    }

    fn find(&self, scope: &Scope, id: &str) -> Option<ContentNode> {
        self.content
            .scopes
            .get(scope)
            .and_then(|nodes| nodes.get(id))
            .cloned()
    }

    fn find_lesson(&self, id: &str) -> Option<Arc<Lesson>> {
        self.content.lessons.get(id).cloned()
    }

    fn find_branching(&self, id: &str) -> Option<Arc<Branching>> {
        self.content.branchings.get(id).cloned()
    }
}

impl ProfileRepository for InMemoryStore {
    fn profile(&self, id: &str) -> Option<Profile> {
        self.read().profiles.iter().find(|p| p.id == id).cloned()
    }

    fn profiles(&self) -> Vec<Profile> {
        self.read().profiles.clone()
    }
}

impl ResourceLedger for InMemoryStore {
    fn balance(&self, profile: &str) -> Resources {
        self.read().balances.get(profile).copied().unwrap_or_default()
    }
}

impl ProgressRepository for InMemoryStore {
    fn choice(&self, profile: &str, branching: &str) -> Option<ProfileBranchingChoice> {
        self.read()
            .choices
            .iter()
            .find(|c| c.profile == profile && c.branching == branching)
            .cloned()
    }

    fn choices(&self, profile: &str) -> Vec<ProfileBranchingChoice> {
        self.read()
            .choices
            .iter()
            .filter(|c| c.profile == profile)
            .cloned()
            .collect()
    }

    fn lessons_done(&self, profile: &str) -> Vec<ProfileLessonDone> {
        self.read()
            .lessons_done
            .iter()
            .filter(|d| d.profile == profile)
            .cloned()
            .collect()
    }

    #[instrument(level = "debug", skip(self, batch), fields(profile = %batch.profile))]
    fn commit(&self, batch: ProgressBatch) -> Result<(), CommitError> {
        let mut state = self.write();

        if let Some(choice) = &batch.choice {
            if state.choices.iter().any(|c| same_slot(c, choice) && !c.is_empty()) {
                return Err(CommitError::Duplicate(choice.branching.clone()));
            }
        }
        if let Some(done) = &batch.lesson_done {
            if state
                .lessons_done
                .iter()
                .any(|d| d.profile == done.profile && d.lesson == done.lesson)
            {
                return Err(CommitError::Duplicate(done.lesson.clone()));
            }
        }

        let available = state
            .balances
            .get(&batch.profile)
            .copied()
            .unwrap_or_default();
        let remaining = available
            .checked_sub(&batch.debit)
            .ok_or(CommitError::Insufficient {
                required: batch.debit,
                available,
            })?;

        let mut next = state.clone();
        if !batch.debit.is_zero() || next.balances.contains_key(&batch.profile) {
            next.balances.insert(batch.profile.clone(), remaining);
        }
        if let Some(choice) = batch.choice {
            next.choices.retain(|c| !same_slot(c, &choice));
            next.choices.push(choice);
        }
        next.lessons_done.extend(batch.lesson_done);

        if let Some(sink) = &self.sink {
            sink.save(&next)?;
        }
        *state = next;
        debug!("committed progress batch, debit {}", batch.debit);
        Ok(())
    }
}

fn same_slot(a: &ProfileBranchingChoice, b: &ProfileBranchingChoice) -> bool {
    a.profile == b.profile && a.branching == b.branching
}
