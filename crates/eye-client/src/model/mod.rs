//! Domain entities.
//!
//! Every entity is an immutable snapshot: a change on the service means
//! fetching a new snapshot, never editing a cached one.

mod activity;
mod filter;
mod id;
mod session;
mod tag;
mod user;

pub use activity::{Activity, ActivityDefinition, ActivityList, ActivityType, Metadata};
pub use filter::{ActivityFilter, MetadataSearch, UserFilter, UserLookup};
pub use id::EntityId;
pub use session::{Session, SessionDefinition};
pub use tag::{Tag, TagList};
pub use user::{User, UserDefinition};

pub(crate) use filter::normalize_email;
pub(crate) use id::{non_empty, null_as_default, timestamp};
