//! Session tracking for in-progress conversations.
//!
//! A [`Session`] exists for an identity from language selection until the
//! final reply. The [`SessionTable`] owns all of them and serializes access
//! per identity.

mod state;
mod table;

pub use state::{Session, SessionView, Stage, StageKind};
pub use table::{SessionGuard, SessionTable, SweeperHandle};
