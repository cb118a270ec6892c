//! # Classroom Test Utilities
//!
//! Shared test utilities for the Live Classroom coordinator.
//!
//! ## Modules
//!
//! - `fixtures` - Courses with an owning teacher and enrolled students
//! - `surfaces` - Recording [`SurfaceHost`](classroom::coordinator::SurfaceHost)
//! - `harness` - In-memory stores, mock engine and mock token issuer wired
//!   into [`ClassroomDeps`](classroom::ClassroomDeps)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use classroom_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = ClassroomHarness::new();
//!     let teacher = harness.join(harness.course.teacher).await.unwrap();
//!     let student = harness.join(harness.course.student(0)).await.unwrap();
//!
//!     teacher.handle.toggle_media(MediaKind::Video).await.unwrap();
//!     // Feed the teacher's publish into the student's engine...
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod surfaces;

pub use fixtures::TestCourse;
pub use harness::{settle, ClassroomHarness, TestParticipant};
pub use surfaces::RecordingSurfaces;
