//! Course and quest trees: per-profile maps, structural depth and active position.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::arena::TreeArena;
use crate::domain::builder::TreeBuilder;
use crate::domain::entities::{
    Branching, BranchingContent, BranchingKind, ContentKind, ContentNode, GraphNode, Lesson,
    Profile, ProfileBranchingChoice, Quest, Scope,
};
use crate::domain::error::{DomainError, DomainResult};

/// Number of lesson slots a six-from-n choice must fill.
pub const SIX_FROM_N_SLOTS: usize = 6;

/// What the traversal reads from the outside world.
pub trait TraversalSource {
    /// Content node with identity `id` inside `scope`.
    fn find(&self, scope: &Scope, id: &str) -> Option<ContentNode>;

    /// Recorded choice of `profile` at `branching`.
    fn choice(&self, profile: &str, branching: &str) -> Option<ProfileBranchingChoice>;

    /// Completed lessons and chosen branchings of `profile`.
    fn interacted(&self, profile: &str) -> HashSet<String>;
}

/// How a revisited node is handled while walking a map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Fail with `DomainError::CycleDetected`
    #[default]
    Error,
    /// Stop the walk at the revisited node
    Truncate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalOptions {
    pub max_quest_depth: usize,
    pub cycle_policy: CyclePolicy,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_quest_depth: 8,
            cycle_policy: CyclePolicy::Error,
        }
    }
}

/// One visible slot of a profile's map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub node: ContentNode,
    /// Innermost quest the entry was spliced from
    pub quest: Option<String>,
}

impl MapEntry {
    pub fn id(&self) -> &str {
        self.node.id()
    }

    pub fn kind(&self) -> ContentKind {
        self.node.kind()
    }
}

/// Index of the first map entry the profile has not interacted with yet,
/// or the map length when everything is done.
pub fn active_from(map: &[MapEntry], interacted: &HashSet<String>) -> usize {
    map.iter()
        .position(|entry| !interacted.contains(entry.id()))
        .unwrap_or(map.len())
}

/// Tree over one course or quest scope.
///
/// Per-profile maps and the max depth are cached for the lifetime of the
/// instance; build a new tree to observe new progress.
pub struct CourseTree<'a> {
    scope: Scope,
    source: &'a dyn TraversalSource,
    options: TraversalOptions,
    level: usize,
    nodes: Option<TreeArena<ContentNode>>,
    quests: RefCell<HashMap<String, Rc<CourseTree<'a>>>>,
    maps: RefCell<HashMap<String, Rc<[MapEntry]>>>,
    max_depth: Cell<Option<usize>>,
}

impl<'a> CourseTree<'a> {
    /// Build the tree of a scope starting at `entry`. A scope without an
    /// entry yields an empty tree.
    #[instrument(level = "debug", skip(source, options))]
    pub fn new(
        scope: Scope,
        entry: Option<&str>,
        source: &'a dyn TraversalSource,
        options: TraversalOptions,
    ) -> DomainResult<Self> {
        Self::with_level(scope, entry, source, options, 0)
    }

    fn with_level(
        scope: Scope,
        entry: Option<&str>,
        source: &'a dyn TraversalSource,
        options: TraversalOptions,
        level: usize,
    ) -> DomainResult<Self> {
        let nodes = match entry {
            Some(entry_id) => {
                let entry_node =
                    source
                        .find(&scope, entry_id)
                        .ok_or_else(|| DomainError::NodeNotFound {
                            id: entry_id.to_string(),
                            scope: scope.to_string(),
                        })?;
                let builder = TreeBuilder::new(scope.to_string());
                Some(builder.build(entry_node, |id| source.find(&scope, id))?)
            }
            None => {
                debug!("{scope} has no entry");
                None
            }
        };

        Ok(Self {
            scope,
            source,
            options,
            level,
            nodes,
            quests: RefCell::new(HashMap::new()),
            maps: RefCell::new(HashMap::new()),
            max_depth: Cell::new(None),
        })
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Registry of nodes reachable from the entry.
    pub fn graph(&self) -> Option<&TreeArena<ContentNode>> {
        self.nodes.as_ref()
    }

    fn quest_id(&self) -> Option<String> {
        match &self.scope {
            Scope::Quest(id) => Some(id.clone()),
            Scope::Course(_) => None,
        }
    }

    fn entry_id(&self) -> Option<String> {
        let nodes = self.nodes.as_ref()?;
        let root = nodes.root()?;
        nodes.get_node(root).map(|n| n.data.id().to_string())
    }

    /// Node of this scope; falls back to the source for identities the
    /// walk from the entry never reached.
    pub fn node(&self, id: &str) -> Option<ContentNode> {
        self.nodes
            .as_ref()
            .and_then(|nodes| nodes.get_by_id(id).cloned())
            .or_else(|| self.source.find(&self.scope, id))
    }

    fn require(&self, id: &str) -> DomainResult<ContentNode> {
        self.node(id).ok_or_else(|| DomainError::NodeNotFound {
            id: id.to_string(),
            scope: self.scope.to_string(),
        })
    }

    pub fn branching(&self, id: &str) -> Option<Arc<Branching>> {
        self.node(id).and_then(|n| n.as_branching().cloned())
    }

    pub fn lesson(&self, id: &str) -> Option<Arc<Lesson>> {
        self.node(id).and_then(|n| n.as_lesson().cloned())
    }

    /// Tree of a quest nested directly in this scope, built on first use.
    pub fn quest_tree(&self, quest: &Quest) -> DomainResult<Rc<CourseTree<'a>>> {
        if let Some(tree) = self.quests.borrow().get(&quest.id) {
            return Ok(Rc::clone(tree));
        }
        let level = self.level + 1;
        if level > self.options.max_quest_depth {
            return Err(DomainError::NestingTooDeep {
                quest: quest.id.clone(),
                limit: self.options.max_quest_depth,
            });
        }
        let tree = Rc::new(CourseTree::with_level(
            Scope::Quest(quest.id.clone()),
            quest.entry.as_deref(),
            self.source,
            self.options,
            level,
        )?);
        self.quests
            .borrow_mut()
            .insert(quest.id.clone(), Rc::clone(&tree));
        Ok(tree)
    }

    /// Already built tree of a quest anywhere below this scope.
    pub fn subtree(&self, quest_id: &str) -> Option<Rc<CourseTree<'a>>> {
        let quests = self.quests.borrow();
        if let Some(tree) = quests.get(quest_id) {
            return Some(Rc::clone(tree));
        }
        quests.values().find_map(|tree| tree.subtree(quest_id))
    }

    fn revisit(&self, id: String) -> DomainResult<()> {
        match self.options.cycle_policy {
            CyclePolicy::Error => Err(DomainError::CycleDetected(id)),
            CyclePolicy::Truncate => {
                warn!("{}: truncating walk at revisited node {}", self.scope, id);
                Ok(())
            }
        }
    }

    fn map_entry(&self, node: ContentNode) -> MapEntry {
        MapEntry {
            node,
            quest: self.quest_id(),
        }
    }

    /// Ordered content visible to `profile`, memoized per profile.
    #[instrument(level = "debug", skip(self, profile), fields(scope = %self.scope, profile = %profile.id))]
    pub fn get_map_for_profile(&self, profile: &Profile) -> DomainResult<Rc<[MapEntry]>> {
        if let Some(map) = self.maps.borrow().get(&profile.id) {
            return Ok(Rc::clone(map));
        }
        let map: Rc<[MapEntry]> = self.resolve_map(profile)?.into();
        self.maps
            .borrow_mut()
            .insert(profile.id.clone(), Rc::clone(&map));
        Ok(map)
    }

    fn resolve_map(&self, profile: &Profile) -> DomainResult<Vec<MapEntry>> {
        let mut map = Vec::new();
        let mut stack: Vec<String> = self.entry_id().into_iter().collect();
        let mut seen = HashSet::new();

        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                self.revisit(id)?;
                break;
            }

            let next = match self.require(&id)? {
                ContentNode::Branching(branching) => {
                    match self.resolve_branching(&branching, profile, &mut map)? {
                        Resolution::Continue(next) => next,
                        Resolution::Frontier => {
                            debug!("{}: frontier at {}", self.scope, branching.id);
                            None
                        }
                    }
                }
                ContentNode::Quest(quest) => {
                    let sub = self.quest_tree(&quest)?;
                    map.extend(sub.get_map_for_profile(profile)?.iter().cloned());
                    quest.continuation().map(String::from)
                }
                node @ ContentNode::Lesson(_) => {
                    let next = node
                        .as_lesson()
                        .and_then(|l| l.continuation().map(String::from));
                    map.push(self.map_entry(node));
                    next
                }
            };

            if let Some(next) = next {
                stack.push(next);
            }
        }

        debug!("{}: map has {} entries", self.scope, map.len());
        Ok(map)
    }

    fn resolve_branching(
        &self,
        branching: &Arc<Branching>,
        profile: &Profile,
        map: &mut Vec<MapEntry>,
    ) -> DomainResult<Resolution> {
        if let BranchingContent::ProfileParameter { parameter, next } = &branching.content {
            let value = profile.attribute((*parameter).into());
            let target = next
                .get(value)
                .ok_or_else(|| DomainError::UnmappedParameter {
                    branching: branching.id.clone(),
                    value: value.to_string(),
                })?;
            return Ok(Resolution::Continue(Some(target.clone())));
        }

        map.push(self.map_entry(ContentNode::Branching(Arc::clone(branching))));

        let choice = match self.source.choice(&profile.id, &branching.id) {
            Some(choice) if !choice.is_empty() => choice,
            _ => return Ok(Resolution::Frontier),
        };

        for id in choice.identities() {
            match self.node(id) {
                Some(node @ ContentNode::Lesson(_)) => map.push(self.map_entry(node)),
                Some(ContentNode::Quest(quest)) => {
                    let sub = self.quest_tree(&quest)?;
                    map.extend(sub.get_map_for_profile(profile)?.iter().cloned());
                }
                _ => {
                    return Err(DomainError::MalformedChoice {
                        branching: branching.id.clone(),
                        id: id.to_string(),
                    })
                }
            }
        }

        Ok(Resolution::Continue(
            branching.continuation().map(String::from),
        ))
    }

    /// Structural, profile-independent upper bound of map slots.
    ///
    /// A choice branching counts its own slot plus the slots its choice can
    /// splice in: the widest candidate for one-from-n, six lesson slots for
    /// six-from-n. A profile-parameter branching takes no slot and bounds its
    /// targets by the deepest one.
    #[instrument(level = "debug", skip(self), fields(scope = %self.scope))]
    pub fn get_max_depth(&self) -> DomainResult<usize> {
        if let Some(depth) = self.max_depth.get() {
            return Ok(depth);
        }

        let depth = self.path_depth(self.entry_id(), &mut HashSet::new())?;
        self.max_depth.set(Some(depth));
        Ok(depth)
    }

    fn path_depth(&self, start: Option<String>, seen: &mut HashSet<String>) -> DomainResult<usize> {
        let mut depth = 0;
        let mut current = start;

        while let Some(id) = current.take() {
            if !seen.insert(id.clone()) {
                self.revisit(id)?;
                break;
            }

            current = match self.require(&id)? {
                ContentNode::Lesson(lesson) => {
                    depth += 1;
                    lesson.continuation().map(String::from)
                }
                ContentNode::Quest(quest) => {
                    depth += self.quest_tree(&quest)?.get_max_depth()?;
                    quest.continuation().map(String::from)
                }
                ContentNode::Branching(branching) => match &branching.content {
                    BranchingContent::ProfileParameter { next, .. } => {
                        let mut deepest = 0;
                        for target in next.values() {
                            let mut branch_seen = seen.clone();
                            deepest =
                                deepest.max(self.path_depth(Some(target.clone()), &mut branch_seen)?);
                        }
                        return Ok(depth + deepest);
                    }
                    BranchingContent::OneFromN { next } => {
                        let mut widest = 0;
                        for candidate in next {
                            widest = widest.max(self.slot_depth(candidate)?);
                        }
                        depth += 1 + widest;
                        branching.continuation().map(String::from)
                    }
                    BranchingContent::SixFromN { .. } => {
                        depth += 1 + SIX_FROM_N_SLOTS;
                        branching.continuation().map(String::from)
                    }
                },
            };
        }

        Ok(depth)
    }

    /// Map slots a single chosen candidate occupies at most.
    fn slot_depth(&self, id: &str) -> DomainResult<usize> {
        match self.node(id) {
            Some(ContentNode::Lesson(_)) => Ok(1),
            Some(ContentNode::Quest(quest)) => self.quest_tree(&quest)?.get_max_depth(),
            _ => Ok(0),
        }
    }

    /// Current position of `profile` in its map.
    pub fn get_active(&self, profile: &Profile) -> DomainResult<usize> {
        let map = self.get_map_for_profile(profile)?;
        let interacted = self.source.interacted(&profile.id);
        Ok(active_from(&map, &interacted))
    }

    /// Index of `lesson_id` in the profile's map.
    pub fn get_lesson_number(&self, profile: &Profile, lesson_id: &str) -> DomainResult<Option<usize>> {
        let map = self.get_map_for_profile(profile)?;
        Ok(lesson_position(&map, lesson_id))
    }

    /// Position of `lesson_id` among the entries of its own quest.
    pub fn get_quest_number(&self, profile: &Profile, lesson_id: &str) -> DomainResult<Option<usize>> {
        let map = self.get_map_for_profile(profile)?;
        let Some(position) = lesson_position(&map, lesson_id) else {
            return Ok(None);
        };
        let Some(quest) = map[position].quest.as_deref() else {
            return Ok(None);
        };
        Ok(Some(
            map[..position]
                .iter()
                .filter(|e| e.quest.as_deref() == Some(quest))
                .count(),
        ))
    }

    /// Lesson slots `id` fills when chosen: 1 for a lesson, the lesson count
    /// of the profile's quest map for a quest, `None` for anything else.
    pub fn lesson_equivalents(&self, profile: &Profile, id: &str) -> DomainResult<Option<usize>> {
        match self.node(id) {
            Some(ContentNode::Lesson(_)) => Ok(Some(1)),
            Some(ContentNode::Quest(quest)) => {
                let map = self.quest_tree(&quest)?.get_map_for_profile(profile)?;
                Ok(Some(
                    map.iter().filter(|e| e.kind() == ContentKind::Lesson).count(),
                ))
            }
            _ => Ok(None),
        }
    }

    /// Whether `branching` is resolved by player choice.
    pub fn is_choice_point(branching: &Branching) -> bool {
        branching.kind() != BranchingKind::ProfileParameter
    }
}

enum Resolution {
    Continue(Option<String>),
    Frontier,
}

fn lesson_position(map: &[MapEntry], lesson_id: &str) -> Option<usize> {
    map.iter()
        .position(|e| e.kind() == ContentKind::Lesson && e.id() == lesson_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Gender, Resources};
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Fixture {
        nodes: HashMap<(Scope, String), ContentNode>,
        choices: HashMap<(String, String), ProfileBranchingChoice>,
        done: HashSet<String>,
        choice_reads: Cell<usize>,
    }

    impl Fixture {
        fn lesson(&mut self, scope: &Scope, id: &str, next: Option<&str>) -> &mut Self {
            let lesson = Lesson {
                id: id.into(),
                title: String::new(),
                next: next.map(String::from),
                quest: None,
                cost: Resources::ZERO,
                location: None,
                npc: None,
                entry_unit: None,
                units: vec![],
            };
            self.nodes.insert(
                (scope.clone(), id.into()),
                ContentNode::Lesson(Arc::new(lesson)),
            );
            self
        }

        fn branching(
            &mut self,
            scope: &Scope,
            id: &str,
            content: BranchingContent,
            next: Option<&str>,
        ) -> &mut Self {
            let branching = Branching {
                id: id.into(),
                title: String::new(),
                content,
                next: next.map(String::from),
                prices: BTreeMap::new(),
            };
            self.nodes.insert(
                (scope.clone(), id.into()),
                ContentNode::Branching(Arc::new(branching)),
            );
            self
        }

        fn quest(&mut self, scope: &Scope, id: &str, entry: &str, next: Option<&str>) -> &mut Self {
            let quest = Quest {
                id: id.into(),
                title: String::new(),
                entry: Some(entry.into()),
                next: next.map(String::from),
                lessons: vec![],
                quests: vec![],
                branchings: vec![],
            };
            self.nodes
                .insert((scope.clone(), id.into()), ContentNode::Quest(Arc::new(quest)));
            self
        }

        fn choose(&mut self, branching: &str, choice: &str) -> &mut Self {
            self.choices.insert(
                ("p1".into(), branching.into()),
                ProfileBranchingChoice {
                    profile: "p1".into(),
                    branching: branching.into(),
                    choice: choice.into(),
                    chosen_at: Utc::now(),
                },
            );
            self.done.insert(branching.into());
            self
        }
    }

    impl TraversalSource for Fixture {
        fn find(&self, scope: &Scope, id: &str) -> Option<ContentNode> {
            self.nodes.get(&(scope.clone(), id.to_string())).cloned()
        }

        fn choice(&self, profile: &str, branching: &str) -> Option<ProfileBranchingChoice> {
            self.choice_reads.set(self.choice_reads.get() + 1);
            self.choices
                .get(&(profile.to_string(), branching.to_string()))
                .cloned()
        }

        fn interacted(&self, _profile: &str) -> HashSet<String> {
            self.done.clone()
        }
    }

    fn course() -> Scope {
        Scope::Course("c1".into())
    }

    fn profile() -> Profile {
        Profile {
            id: "p1".into(),
            gender: Gender::Male,
            laboratory: "lab-a".into(),
            university_position: None,
        }
    }

    fn ids(map: &[MapEntry]) -> Vec<&str> {
        map.iter().map(MapEntry::id).collect()
    }

    fn one_from_n(candidates: &[&str]) -> BranchingContent {
        BranchingContent::OneFromN {
            next: candidates.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn given_unchosen_branching_when_mapping_then_stops_at_frontier() {
        let c = course();
        let mut fx = Fixture::default();
        fx.lesson(&c, "A", Some("B"))
            .branching(&c, "B", one_from_n(&["C", "D"]), None)
            .lesson(&c, "C", None)
            .lesson(&c, "D", None);

        let tree = CourseTree::new(c, Some("A"), &fx, TraversalOptions::default()).unwrap();
        let map = tree.get_map_for_profile(&profile()).unwrap();

        assert_eq!(ids(&map), vec!["A", "B"]);
        assert_eq!(tree.get_active(&profile()).unwrap(), 0);
    }

    #[test]
    fn given_map_when_requested_twice_then_choices_read_once() {
        let c = course();
        let mut fx = Fixture::default();
        fx.lesson(&c, "A", Some("B"))
            .branching(&c, "B", one_from_n(&["C"]), None)
            .lesson(&c, "C", None)
            .choose("B", "C");

        let tree = CourseTree::new(c, Some("A"), &fx, TraversalOptions::default()).unwrap();
        let first = tree.get_map_for_profile(&profile()).unwrap();
        let second = tree.get_map_for_profile(&profile()).unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.choice_reads.get(), 1);
    }

    #[test]
    fn given_profile_parameter_when_mapping_then_branching_is_transparent() {
        let c = course();
        let mut fx = Fixture::default();
        let next = BTreeMap::from([
            ("male".to_string(), "L1".to_string()),
            ("female".to_string(), "L2".to_string()),
        ]);
        fx.branching(&c, "P", BranchingContent::ProfileParameter { parameter: 2, next }, None)
            .lesson(&c, "L1", None)
            .lesson(&c, "L2", None);

        let tree = CourseTree::new(c, Some("P"), &fx, TraversalOptions::default()).unwrap();

        assert_eq!(ids(&tree.get_map_for_profile(&profile()).unwrap()), vec!["L1"]);
        assert_eq!(tree.get_max_depth().unwrap(), 1);
    }

    #[test]
    fn given_chosen_quest_when_bounding_depth_then_map_fits() {
        let c = course();
        let q = Scope::Quest("Q".into());
        let mut fx = Fixture::default();
        fx.lesson(&c, "A", Some("B"))
            .branching(&c, "B", one_from_n(&["C", "Q"]), Some("Z"))
            .lesson(&c, "C", None)
            .quest(&c, "Q", "Q1", None)
            .lesson(&q, "Q1", Some("Q2"))
            .lesson(&q, "Q2", None)
            .lesson(&c, "Z", None)
            .choose("B", "Q");

        let tree = CourseTree::new(c, Some("A"), &fx, TraversalOptions::default()).unwrap();
        let map = tree.get_map_for_profile(&profile()).unwrap();

        assert_eq!(ids(&map), vec!["A", "B", "Q1", "Q2", "Z"]);
        assert_eq!(tree.get_max_depth().unwrap(), 5);
    }

    #[test]
    fn given_uneven_parameter_targets_when_bounding_depth_then_deepest_wins() {
        let c = course();
        let mut fx = Fixture::default();
        let next = BTreeMap::from([
            ("lab-a".to_string(), "L1".to_string()),
            ("lab-b".to_string(), "M1".to_string()),
        ]);
        fx.branching(&c, "P", BranchingContent::ProfileParameter { parameter: 1, next }, None)
            .lesson(&c, "L1", None)
            .lesson(&c, "M1", Some("M2"))
            .lesson(&c, "M2", None);

        let tree = CourseTree::new(c, Some("P"), &fx, TraversalOptions::default()).unwrap();

        assert_eq!(tree.get_max_depth().unwrap(), 2);
    }

    #[test]
    fn given_cycle_when_mapping_then_policy_decides() {
        let c = course();
        let mut fx = Fixture::default();
        fx.lesson(&c, "A", Some("B")).lesson(&c, "B", Some("A"));

        let strict = CourseTree::new(c.clone(), Some("A"), &fx, TraversalOptions::default()).unwrap();
        assert_eq!(
            strict.get_map_for_profile(&profile()).unwrap_err(),
            DomainError::CycleDetected("A".into())
        );

        let lenient = TraversalOptions {
            cycle_policy: CyclePolicy::Truncate,
            ..TraversalOptions::default()
        };
        let tree = CourseTree::new(c, Some("A"), &fx, lenient).unwrap();
        assert_eq!(ids(&tree.get_map_for_profile(&profile()).unwrap()), vec!["A", "B"]);
    }

    #[test]
    fn given_self_nesting_quest_when_mapping_then_depth_guard_fails() {
        let c = course();
        let mut fx = Fixture::default();
        fx.quest(&c, "Q", "Q", None)
            .quest(&Scope::Quest("Q".into()), "Q", "Q", None);

        let options = TraversalOptions {
            max_quest_depth: 3,
            ..TraversalOptions::default()
        };
        let tree = CourseTree::new(c, Some("Q"), &fx, options).unwrap();

        assert!(matches!(
            tree.get_map_for_profile(&profile()),
            Err(DomainError::NestingTooDeep { limit: 3, .. })
        ));
    }

    #[test]
    fn given_interactions_when_computing_active_then_first_untouched_index() {
        let map: Vec<MapEntry> = ["A", "B", "C"]
            .iter()
            .map(|id| MapEntry {
                node: ContentNode::Lesson(Arc::new(Lesson {
                    id: id.to_string(),
                    title: String::new(),
                    next: None,
                    quest: None,
                    cost: Resources::ZERO,
                    location: None,
                    npc: None,
                    entry_unit: None,
                    units: vec![],
                })),
                quest: None,
            })
            .collect();

        let none = HashSet::new();
        let some: HashSet<String> = ["A".to_string()].into();
        let all: HashSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();

        assert_eq!(active_from(&map, &none), 0);
        assert_eq!(active_from(&map, &some), 1);
        assert_eq!(active_from(&map, &all), 3);
    }
}
