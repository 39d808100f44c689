//! Recording progress: branching choices and lesson completions
//!
//! Every rule is checked before anything is written; the record and its
//! resource debit are committed as one batch.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use itertools::Itertools;
use tracing::{debug, info, instrument};

use crate::application::services::CourseService;
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{
    BranchingKind, ContentKind, CourseTree, MapEntry, Profile, ProfileBranchingChoice,
    ProfileLessonDone, SIX_FROM_N_SLOTS,
};
use crate::infrastructure::traits::{
    CommitError, ProgressBatch, ProgressRepository, ResourceLedger,
};

pub struct ProgressService {
    courses: Arc<CourseService>,
    progress: Arc<dyn ProgressRepository>,
    ledger: Arc<dyn ResourceLedger>,
}

impl ProgressService {
    pub fn new(
        courses: Arc<CourseService>,
        progress: Arc<dyn ProgressRepository>,
        ledger: Arc<dyn ResourceLedger>,
    ) -> Self {
        Self {
            courses,
            progress,
            ledger,
        }
    }

    /// Record the identities `profile_id` picked at `branching_id`, in the
    /// order given, and debit their price.
    #[instrument(level = "debug", skip(self))]
    pub fn choose(
        &self,
        course_id: &str,
        profile_id: &str,
        branching_id: &str,
        identities: &[String],
    ) -> ApplicationResult<ProfileBranchingChoice> {
        let profile = self.courses.profile(profile_id)?;
        let branching = self
            .courses
            .find_branching(branching_id)
            .ok_or_else(|| ApplicationError::UnknownBranching(branching_id.to_string()))?;
        if !CourseTree::is_choice_point(&branching) {
            return Err(ApplicationError::NotChoosable(branching_id.to_string()));
        }

        let price = self.courses.with_tree(course_id, |tree| {
            let map = tree.get_map_for_profile(&profile)?;
            let entry = map
                .iter()
                .find(|e| e.kind() == ContentKind::Branching && e.id() == branching_id)
                .cloned()
                .ok_or_else(|| ApplicationError::NotReached(branching_id.to_string()))?;

            // an empty record does not count as a choice
            if self
                .progress
                .choice(&profile.id, branching_id)
                .is_some_and(|c| !c.is_empty())
            {
                return Err(ApplicationError::AlreadyChosen(branching_id.to_string()));
            }

            validate_identities(branching_id, branching.candidates(), identities)?;

            match branching.kind() {
                BranchingKind::OneFromN if identities.len() != 1 => {
                    return Err(ApplicationError::WrongChoiceCount {
                        branching: branching_id.to_string(),
                        expected: 1,
                        actual: identities.len(),
                    });
                }
                BranchingKind::SixFromN => {
                    let slots = lesson_slots(tree, &entry, &profile, identities)?;
                    if slots != SIX_FROM_N_SLOTS {
                        return Err(ApplicationError::WrongChoiceCount {
                            branching: branching_id.to_string(),
                            expected: SIX_FROM_N_SLOTS,
                            actual: slots,
                        });
                    }
                }
                _ => {}
            }

            Ok(branching.price_of(identities.iter().map(String::as_str)))
        })?;

        let available = self.ledger.balance(&profile.id);
        if !available.covers(&price) {
            return Err(ApplicationError::InsufficientResources {
                required: price,
                available,
            });
        }

        let choice = ProfileBranchingChoice {
            profile: profile.id.clone(),
            branching: branching_id.to_string(),
            choice: identities.join(","),
            chosen_at: Utc::now(),
        };
        self.commit(
            ProgressBatch::new(&profile.id)
                .debit(price)
                .choice(choice.clone()),
        )?;
        info!(
            "{} chose [{}] at {} for {}",
            profile.id, choice.choice, branching_id, price
        );
        Ok(choice)
    }

    /// Mark `lesson_id` done for `profile_id` and debit the lesson cost.
    #[instrument(level = "debug", skip(self))]
    pub fn complete_lesson(
        &self,
        course_id: &str,
        profile_id: &str,
        lesson_id: &str,
    ) -> ApplicationResult<ProfileLessonDone> {
        let profile = self.courses.profile(profile_id)?;
        let lesson = self
            .courses
            .find_lesson(lesson_id)
            .ok_or_else(|| ApplicationError::UnknownLesson(lesson_id.to_string()))?;

        self.courses.with_tree(course_id, |tree| {
            let active = tree.get_active(&profile)?;
            match tree.get_lesson_number(&profile, lesson_id)? {
                Some(position) if position <= active => {
                    debug!("{lesson_id} at {position}, active {active}");
                    Ok(())
                }
                _ => Err(ApplicationError::NotReached(lesson_id.to_string())),
            }
        })?;

        if self
            .progress
            .lessons_done(&profile.id)
            .iter()
            .any(|d| d.lesson == lesson_id)
        {
            return Err(ApplicationError::AlreadyCompleted(lesson_id.to_string()));
        }

        let available = self.ledger.balance(&profile.id);
        if !available.covers(&lesson.cost) {
            return Err(ApplicationError::InsufficientResources {
                required: lesson.cost,
                available,
            });
        }

        let done = ProfileLessonDone {
            profile: profile.id.clone(),
            lesson: lesson_id.to_string(),
            completed_at: Utc::now(),
        };
        self.commit(
            ProgressBatch::new(&profile.id)
                .debit(lesson.cost)
                .lesson_done(done.clone()),
        )?;
        info!("{} completed {}", profile.id, lesson_id);
        Ok(done)
    }

    fn commit(&self, batch: ProgressBatch) -> ApplicationResult<()> {
        self.progress.commit(batch).map_err(|e| match e {
            CommitError::Insufficient {
                required,
                available,
            } => ApplicationError::InsufficientResources {
                required,
                available,
            },
            CommitError::Duplicate(id) => ApplicationError::Conflict(id),
            CommitError::Persist(source) => ApplicationError::OperationFailed {
                context: "persist progress".to_string(),
                source: Box::new(source),
            },
        })
    }
}

fn validate_identities(
    branching: &str,
    candidates: &[String],
    identities: &[String],
) -> ApplicationResult<()> {
    let invalid = |reason: String| ApplicationError::InvalidChoice {
        branching: branching.to_string(),
        reason,
    };

    if identities.is_empty() {
        return Err(invalid("no identities given".to_string()));
    }
    if let Some(dup) = identities.iter().duplicates().next() {
        return Err(invalid(format!("{dup} given twice")));
    }
    let allowed: HashSet<&str> = candidates.iter().map(String::as_str).collect();
    if let Some(foreign) = identities.iter().find(|id| !allowed.contains(id.as_str())) {
        return Err(invalid(format!("{foreign} is not a candidate")));
    }
    Ok(())
}

/// Lesson slots the identities fill, counted in the scope the branching
/// lives in.
fn lesson_slots(
    tree: &CourseTree<'_>,
    entry: &MapEntry,
    profile: &Profile,
    identities: &[String],
) -> ApplicationResult<usize> {
    let scope_tree = entry.quest.as_deref().and_then(|q| tree.subtree(q));
    let mut total = 0;
    for id in identities {
        let slots = match &scope_tree {
            Some(sub) => sub.lesson_equivalents(profile, id)?,
            None => tree.lesson_equivalents(profile, id)?,
        };
        total += slots.unwrap_or(0);
    }
    Ok(total)
}
