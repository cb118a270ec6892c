//! Live Classroom Coordinator Library
//!
//! Coordinates the live-video portion of a course: who may open a
//! classroom, how a participant's media role follows their camera and
//! microphone, how remote media is rendered once it actually exists, and
//! how everything is released when a participant leaves.
//!
//! # Architecture
//!
//! ```text
//! SessionLifecycle (shared, stateless)
//! ├── SessionStore / CourseDirectory (Postgres or in-memory)
//! └── ClassroomActor (one per joined classroom)
//!     ├── TokenIssuer    credential for the channel binding
//!     ├── MediaEngine    join, tracks, remote notifications
//!     └── SurfaceHost    render surfaces owned by the UI
//! ```
//!
//! # Key Design Decisions
//!
//! - **One binding value**: the (channel, uid, role) tuple is built once and
//!   handed to both the token issuer and the engine join
//! - **Listener by default**: students join subscribe-only and upgrade to
//!   presenter only while publishing
//! - **Bind on demand**: remote media is rendered only once its payload and
//!   surface both exist, with bounded retries
//! - **Teardown always runs**: leave, stop, cancellation and dropped handles
//!   share one cleanup path
//!
//! # Modules
//!
//! - [`coordinator`] - Classroom actor and its components
//! - [`services`] - Session lifecycle and token issuer
//! - [`repositories`] - Session and course persistence
//! - [`engine`] - Media engine abstraction
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types with stable codes
//! - [`observability`] - Tracing and metrics

#![warn(clippy::pedantic)]

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod errors;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;

pub use config::Config;
pub use coordinator::{ClassroomActor, ClassroomDeps, ClassroomHandle, JoinedClassroom};
pub use errors::ClassroomError;
