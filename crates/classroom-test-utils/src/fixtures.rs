//! Pre-configured course data.

use classroom::models::Actor;
use classroom::repositories::InMemoryCourseDirectory;
use common::types::{CourseId, UserId};

/// A course with its owning teacher and enrolled students.
#[derive(Debug, Clone)]
pub struct TestCourse {
    pub course_id: CourseId,
    pub teacher: Actor,
    pub students: Vec<Actor>,
}

impl TestCourse {
    /// Course with one enrolled student.
    #[must_use]
    pub fn new() -> Self {
        Self::with_students(1)
    }

    /// Course with `count` enrolled students.
    #[must_use]
    pub fn with_students(count: usize) -> Self {
        Self {
            course_id: CourseId::new(),
            teacher: Actor::teacher(UserId::new()),
            students: (0..count).map(|_| Actor::student(UserId::new())).collect(),
        }
    }

    /// The `index`th enrolled student.
    ///
    /// # Panics
    ///
    /// If the course has fewer students.
    #[must_use]
    pub fn student(&self, index: usize) -> Actor {
        self.students[index]
    }

    /// A student who is not enrolled.
    #[must_use]
    pub fn outsider() -> Actor {
        Actor::student(UserId::new())
    }

    /// Register the course and its enrollments.
    pub fn install(&self, courses: &InMemoryCourseDirectory) {
        courses.add_course(self.course_id, self.teacher.user_id);
        for student in &self.students {
            courses.enroll(self.course_id, student.user_id);
        }
    }
}

impl Default for TestCourse {
    fn default() -> Self {
        Self::new()
    }
}
