//! Lesson unit tree: streams a lesson's units in displayable chunks.

use std::collections::{HashMap, HashSet};

use generational_arena::Index;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::domain::arena::TreeArena;
use crate::domain::builder::TreeBuilder;
use crate::domain::dispatch::SerializerTable;
use crate::domain::entities::{GraphNode, Lesson, LessonUnit};
use crate::domain::error::{DomainError, DomainResult};

/// Next displayable piece of a lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitChunk {
    pub units: Vec<Value>,
    pub location: Option<String>,
    pub npc: Option<String>,
    /// Last real unit delivered; pass it back to continue
    pub last: Option<String>,
    /// No further units follow this chunk
    pub finished: bool,
}

pub struct LessonUnitTree {
    lesson: String,
    location: Option<String>,
    npc: Option<String>,
    units: Option<TreeArena<LessonUnit>>,
    serializers: SerializerTable,
}

impl LessonUnitTree {
    /// Build the unit graph from the lesson's entry unit, or from its first
    /// unit when no entry is set.
    #[instrument(level = "debug", skip(lesson), fields(lesson = %lesson.id))]
    pub fn new(lesson: &Lesson) -> DomainResult<Self> {
        let by_id: HashMap<&str, &LessonUnit> =
            lesson.units.iter().map(|u| (u.id.as_str(), u)).collect();

        let entry = match lesson.entry_unit.as_deref() {
            Some(id) => Some(by_id.get(id).copied().ok_or_else(|| DomainError::UnitNotFound {
                lesson: lesson.id.clone(),
                unit: id.to_string(),
            })?),
            None => lesson.units.first(),
        };

        let units = match entry {
            Some(entry) => {
                let builder = TreeBuilder::new(format!("lesson:{}", lesson.id));
                Some(builder.build(entry.clone(), |id| by_id.get(id).map(|u| (*u).clone()))?)
            }
            None => None,
        };

        Ok(Self {
            lesson: lesson.id.clone(),
            location: lesson.location.clone(),
            npc: lesson.npc.clone(),
            units,
            serializers: SerializerTable::standard(),
        })
    }

    pub fn len(&self) -> usize {
        self.units.as_ref().map_or(0, TreeArena::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unit(&self, units: &TreeArena<LessonUnit>, idx: Index) -> DomainResult<LessonUnit> {
        units
            .get_node(idx)
            .map(|n| n.data.clone())
            .ok_or_else(|| DomainError::UnitNotFound {
                lesson: self.lesson.clone(),
                unit: format!("{idx:?}"),
            })
    }

    /// Units to show after `start`, or from the entry when `start` is None.
    ///
    /// Stops before a blocking unit once something is queued, at a fork
    /// (emitting one choice unit bundling every alternative), or at the end.
    #[instrument(level = "debug", skip(self), fields(lesson = %self.lesson))]
    pub fn next_chunk(&self, start: Option<&str>) -> DomainResult<UnitChunk> {
        let Some(units) = self.units.as_ref() else {
            return Ok(self.chunk(Vec::new(), None, true));
        };

        let (mut current, mut queued) = match start {
            Some(id) => {
                let idx = units.find(id).ok_or_else(|| DomainError::UnitNotFound {
                    lesson: self.lesson.clone(),
                    unit: id.to_string(),
                })?;
                (idx, Vec::new())
            }
            None => {
                let root = units.root().ok_or_else(|| DomainError::MissingEntry(self.lesson.clone()))?;
                (root, vec![root])
            }
        };

        let mut seen = HashSet::from([current]);
        let mut choice = None;
        let mut finished = false;

        loop {
            let children = units
                .get_node(current)
                .map(|n| n.children.clone())
                .unwrap_or_default();

            match children.as_slice() {
                [] => {
                    finished = true;
                    break;
                }
                [child] => {
                    let child = *child;
                    let blocking = self.unit(units, child)?.kind().is_blocking();
                    if blocking && !queued.is_empty() {
                        break;
                    }
                    if !seen.insert(child) {
                        debug!("{}: unit loop at {:?}", self.lesson, child);
                        break;
                    }
                    queued.push(child);
                    current = child;
                }
                many => {
                    let options = many
                        .iter()
                        .map(|&idx| self.unit(units, idx))
                        .collect::<DomainResult<Vec<_>>>()?;
                    let refs: Vec<&LessonUnit> = options.iter().collect();
                    choice = Some(self.serializers.choice(&refs));
                    break;
                }
            }
        }

        let delivered = queued
            .iter()
            .map(|&idx| self.unit(units, idx))
            .collect::<DomainResult<Vec<_>>>()?;
        let first = delivered.first();
        let location = first.and_then(|u| u.location.clone()).or_else(|| self.location.clone());
        let npc = first.and_then(|u| u.npc.clone()).or_else(|| self.npc.clone());
        let last = delivered.last().map(|u| u.id.clone());

        let mut payload: Vec<Value> = delivered.iter().map(|u| self.serializers.serialize(u)).collect();
        payload.extend(choice);

        Ok(UnitChunk {
            units: payload,
            location,
            npc,
            last,
            finished,
        })
    }

    fn chunk(&self, units: Vec<Value>, last: Option<String>, finished: bool) -> UnitChunk {
        UnitChunk {
            units,
            location: self.location.clone(),
            npc: self.npc.clone(),
            last,
            finished,
        }
    }

    /// Most task units met on any simple path from the entry.
    ///
    /// Depth-first with backtracking: the running count drops again when the
    /// walk leaves a task unit, so forks are not counted twice.
    #[instrument(level = "debug", skip(self), fields(lesson = %self.lesson))]
    pub fn task_count(&self) -> usize {
        let Some(units) = self.units.as_ref() else {
            return 0;
        };
        let Some(root) = units.root() else {
            return 0;
        };

        let is_task = |idx: Index| {
            units
                .get_node(idx)
                .is_some_and(|n| n.data.kind().is_task())
        };

        let mut stack = vec![(root, false)];
        let mut on_path = HashSet::new();
        let mut current = 0usize;
        let mut best = 0usize;

        while let Some((idx, expanded)) = stack.pop() {
            if expanded {
                on_path.remove(&idx);
                if is_task(idx) {
                    current -= 1;
                }
                continue;
            }
            if on_path.contains(&idx) {
                continue;
            }

            on_path.insert(idx);
            if is_task(idx) {
                current += 1;
                best = best.max(current);
            }
            stack.push((idx, true));

            if let Some(node) = units.get_node(idx) {
                for &child in node.children.iter().rev() {
                    if !on_path.contains(&child) {
                        stack.push((child, false));
                    }
                }
            }
        }

        debug!("{}: task count {}", self.lesson, best);
        best
    }
}
