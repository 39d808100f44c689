//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on the persistence ports (ContentRepository,
//! ProgressRepository, etc.) but are themselves concrete structs, not traits.

mod course;
mod progress;

pub use course::{CourseService, CourseStatus, RepositorySource};
pub use progress::ProgressService;
