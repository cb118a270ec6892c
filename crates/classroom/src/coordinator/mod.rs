//! Per-classroom coordination.
//!
//! ```text
//! ClassroomActor (one per joined classroom)
//! ├── RoleController             local role and tracks
//! ├── RemoteParticipantRegistry  remote uids and their tracks
//! ├── RenderBinder               bind retries for local and remote media
//! └── CleanupCoordinator         teardown on every exit path
//! ```
//!
//! All four components are owned by the actor task; nothing is shared
//! between classrooms except the collaborators in [`ClassroomDeps`].

pub mod binder;
pub mod classroom;
pub mod cleanup;
pub mod messages;
pub mod registry;
pub mod role;

pub use binder::{
    BindOutcome, BindPolicy, BindState, BindTarget, RenderBinder, SurfaceHost, SurfaceKey,
    SurfaceSize, TrackSource,
};
pub use classroom::{ClassroomActor, ClassroomDeps, ClassroomHandle, JoinedClassroom};
pub use cleanup::{
    ChannelState, CleanupCoordinator, TeardownFailure, TeardownReport, TeardownStep,
};
pub use messages::{ClassroomMessage, ClassroomState};
pub use registry::{RegistryChange, RemoteParticipant, RemoteParticipantRegistry};
pub use role::{RoleController, RolePolicy, RoleState};
