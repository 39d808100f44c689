//! Domain entities: core data structures

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel `next` value marking the end of a path.
pub const END_SENTINEL: &str = "end";

/// A node of a content graph: something with an identity and outgoing edges.
pub trait GraphNode {
    /// Local identity used for graph edges (not the storage key).
    fn id(&self) -> &str;

    /// Identities this node may continue to.
    fn next_ids(&self) -> Vec<&str>;
}

/// Lookup scope for content identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Course(String),
    Quest(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Course(id) => write!(f, "course:{id}"),
            Scope::Quest(id) => write!(f, "quest:{id}"),
        }
    }
}

/// In-game resource amounts. Used both as a wallet balance and as a price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub energy: u32,
    pub money: u32,
    pub time: u32,
}

impl Resources {
    pub const ZERO: Resources = Resources {
        energy: 0,
        money: 0,
        time: 0,
    };

    pub fn new(energy: u32, money: u32, time: u32) -> Self {
        Self {
            energy,
            money,
            time,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// True if this balance can pay `price` in every resource.
    pub fn covers(&self, price: &Resources) -> bool {
        self.energy >= price.energy && self.money >= price.money && self.time >= price.time
    }

    pub fn checked_sub(&self, price: &Resources) -> Option<Resources> {
        Some(Resources {
            energy: self.energy.checked_sub(price.energy)?,
            money: self.money.checked_sub(price.money)?,
            time: self.time.checked_sub(price.time)?,
        })
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            energy: self.energy.saturating_add(rhs.energy),
            money: self.money.saturating_add(rhs.money),
            time: self.time.saturating_add(rhs.time),
        }
    }
}

impl Sum for Resources {
    fn sum<I: Iterator<Item = Resources>>(iter: I) -> Self {
        iter.fold(Resources::ZERO, Add::add)
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "energy={} money={} time={}",
            self.energy, self.money, self.time
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// Profile attribute selected by a profile-parameter branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileParameter {
    Gender,
    Laboratory,
}

impl From<u8> for ProfileParameter {
    /// `2` selects gender, every other code selects the laboratory.
    fn from(code: u8) -> Self {
        match code {
            2 => ProfileParameter::Gender,
            _ => ProfileParameter::Laboratory,
        }
    }
}

/// The actor traversing a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub gender: Gender,
    pub laboratory: String,
    #[serde(default)]
    pub university_position: Option<String>,
}

impl Profile {
    pub fn attribute(&self, parameter: ProfileParameter) -> &str {
        match parameter {
            ProfileParameter::Gender => self.gender.as_str(),
            ProfileParameter::Laboratory => &self.laboratory,
        }
    }
}

/// Root container of a content graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub quests: Vec<Quest>,
    #[serde(default)]
    pub branchings: Vec<Branching>,
}

/// Named sub-graph with its own entry. The quest node lives in the enclosing
/// scope, its lessons, branchings and child quests live in the quest scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub quests: Vec<Quest>,
    #[serde(default)]
    pub branchings: Vec<Branching>,
}

impl Quest {
    pub fn continuation(&self) -> Option<&str> {
        continuation(self.next.as_deref())
    }
}

/// Atomic content unit of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub quest: Option<String>,
    /// Charged when the lesson is completed.
    #[serde(default)]
    pub cost: Resources,
    /// Default location for units that do not set one.
    #[serde(default)]
    pub location: Option<String>,
    /// Default speaking NPC for units that do not set one.
    #[serde(default)]
    pub npc: Option<String>,
    #[serde(default)]
    pub entry_unit: Option<String>,
    #[serde(default)]
    pub units: Vec<LessonUnit>,
}

impl Lesson {
    /// Next identity, `None` at the end of a path.
    pub fn continuation(&self) -> Option<&str> {
        continuation(self.next.as_deref())
    }
}

fn continuation(next: Option<&str>) -> Option<&str> {
    next.filter(|n| !n.is_empty() && *n != END_SENTINEL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchingKind {
    ProfileParameter,
    OneFromN,
    SixFromN,
}

impl fmt::Display for BranchingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BranchingKind::ProfileParameter => "profile_parameter",
            BranchingKind::OneFromN => "one_from_n",
            BranchingKind::SixFromN => "six_from_n",
        };
        f.write_str(s)
    }
}

/// Branching payload; its shape depends on the branching type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BranchingContent {
    ProfileParameter {
        parameter: u8,
        next: BTreeMap<String, String>,
    },
    OneFromN {
        next: Vec<String>,
    },
    SixFromN {
        next: Vec<String>,
    },
}

/// Decision point of a content graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branching {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub content: BranchingContent,
    /// Post-branch continuation for player-choice branchings.
    #[serde(default)]
    pub next: Option<String>,
    /// Price of choosing a candidate, keyed by candidate identity.
    #[serde(default)]
    pub prices: BTreeMap<String, Resources>,
}

impl Branching {
    pub fn kind(&self) -> BranchingKind {
        match self.content {
            BranchingContent::ProfileParameter { .. } => BranchingKind::ProfileParameter,
            BranchingContent::OneFromN { .. } => BranchingKind::OneFromN,
            BranchingContent::SixFromN { .. } => BranchingKind::SixFromN,
        }
    }

    /// Player-selectable identities; empty for profile-parameter branchings.
    pub fn candidates(&self) -> &[String] {
        match &self.content {
            BranchingContent::OneFromN { next } | BranchingContent::SixFromN { next } => next,
            BranchingContent::ProfileParameter { .. } => &[],
        }
    }

    pub fn continuation(&self) -> Option<&str> {
        continuation(self.next.as_deref())
    }

    /// Total price of choosing `identities`. Unpriced candidates are free.
    pub fn price_of<'a>(&self, identities: impl IntoIterator<Item = &'a str>) -> Resources {
        identities
            .into_iter()
            .filter_map(|id| self.prices.get(id).copied())
            .sum()
    }
}

/// Choice a profile recorded at a branching (comma-joined identities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileBranchingChoice {
    pub profile: String,
    pub branching: String,
    pub choice: String,
    pub chosen_at: DateTime<Utc>,
}

impl ProfileBranchingChoice {
    /// Chosen identities in the order the player selected them.
    pub fn identities(&self) -> Vec<&str> {
        self.choice
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.identities().is_empty()
    }
}

/// Completion record of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileLessonDone {
    pub profile: String,
    pub lesson: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Lesson,
    Quest,
    Branching,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentKind::Lesson => "lesson",
            ContentKind::Quest => "quest",
            ContentKind::Branching => "branching",
        };
        f.write_str(s)
    }
}

/// A content entity of any kind, shared cheaply between trees.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentNode {
    Lesson(Arc<Lesson>),
    Quest(Arc<Quest>),
    Branching(Arc<Branching>),
}

impl ContentNode {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentNode::Lesson(_) => ContentKind::Lesson,
            ContentNode::Quest(_) => ContentKind::Quest,
            ContentNode::Branching(_) => ContentKind::Branching,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ContentNode::Lesson(l) => &l.title,
            ContentNode::Quest(q) => &q.title,
            ContentNode::Branching(b) => &b.title,
        }
    }

    pub fn as_lesson(&self) -> Option<&Arc<Lesson>> {
        match self {
            ContentNode::Lesson(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_quest(&self) -> Option<&Arc<Quest>> {
        match self {
            ContentNode::Quest(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_branching(&self) -> Option<&Arc<Branching>> {
        match self {
            ContentNode::Branching(b) => Some(b),
            _ => None,
        }
    }
}

impl GraphNode for ContentNode {
    fn id(&self) -> &str {
        match self {
            ContentNode::Lesson(l) => &l.id,
            ContentNode::Quest(q) => &q.id,
            ContentNode::Branching(b) => &b.id,
        }
    }

    fn next_ids(&self) -> Vec<&str> {
        match self {
            ContentNode::Lesson(l) => l.continuation().into_iter().collect(),
            ContentNode::Quest(q) => q.continuation().into_iter().collect(),
            ContentNode::Branching(b) => {
                let mut ids: Vec<&str> = match &b.content {
                    BranchingContent::ProfileParameter { next, .. } => {
                        next.values().map(String::as_str).collect()
                    }
                    BranchingContent::OneFromN { next } | BranchingContent::SixFromN { next } => {
                        next.iter().map(String::as_str).collect()
                    }
                };
                if let Some(after) = b.continuation() {
                    ids.push(after);
                }
                ids
            }
        }
    }
}

impl fmt::Display for ContentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// Unit of lesson content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonUnit {
    pub id: String,
    #[serde(flatten)]
    pub body: UnitBody,
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub npc: Option<String>,
}

impl LessonUnit {
    pub fn kind(&self) -> UnitKind {
        self.body.kind()
    }
}

impl GraphNode for LessonUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_ids(&self) -> Vec<&str> {
        self.next.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitBody {
    Dialogue { text: String },
    Theory {
        #[serde(default)]
        title: String,
        text: String,
    },
    Image { url: String },
    Reply { text: String },
    Email {
        subject: String,
        #[serde(default)]
        body: String,
    },
    Button { label: String },
    Task(Task),
}

impl UnitBody {
    pub fn kind(&self) -> UnitKind {
        match self {
            UnitBody::Dialogue { .. } => UnitKind::Dialogue,
            UnitBody::Theory { .. } => UnitKind::Theory,
            UnitBody::Image { .. } => UnitKind::Image,
            UnitBody::Reply { .. } => UnitKind::Reply,
            UnitBody::Email { .. } => UnitKind::Email,
            UnitBody::Button { .. } => UnitKind::Button,
            UnitBody::Task(_) => UnitKind::Task,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SingleChoice,
    MultipleChoice,
    TextAnswer,
    Ordering,
}

/// Tag of a lesson unit, used for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Dialogue,
    Theory,
    Image,
    Reply,
    Email,
    Button,
    Task,
}

impl UnitKind {
    pub const ALL: [UnitKind; 7] = [
        UnitKind::Dialogue,
        UnitKind::Theory,
        UnitKind::Image,
        UnitKind::Reply,
        UnitKind::Email,
        UnitKind::Button,
        UnitKind::Task,
    ];

    /// Units that need a user action before more content is streamed.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            UnitKind::Reply | UnitKind::Email | UnitKind::Button | UnitKind::Task
        )
    }

    pub fn is_task(&self) -> bool {
        matches!(self, UnitKind::Task)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Dialogue => "dialogue",
            UnitKind::Theory => "theory",
            UnitKind::Image => "image",
            UnitKind::Reply => "reply",
            UnitKind::Email => "email",
            UnitKind::Button => "button",
            UnitKind::Task => "task",
        }
    }
}
