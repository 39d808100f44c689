//! Domain layer: entities and traversal logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod builder;
pub mod course_tree;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod unit_tree;

pub use arena::{TreeArena, TreeNode, TreeNodeConvert};
pub use builder::TreeBuilder;
pub use course_tree::{
    active_from, CourseTree, CyclePolicy, MapEntry, TraversalOptions, TraversalSource,
    SIX_FROM_N_SLOTS,
};
pub use dispatch::{SerializerTable, SummaryTable};
pub use entities::*;
pub use error::{DomainError, DomainResult};
pub use unit_tree::{LessonUnitTree, UnitChunk};
