pub mod api;
pub mod error;
pub mod events;
pub mod ids;
pub mod items;
pub mod revisions;
pub mod time;
pub mod transitions;
pub mod users;

pub use api::*;
pub use error::{VellumError, VellumResult};
pub use events::DomainEvent;
pub use ids::*;
pub use items::*;
pub use revisions::Revision;
pub use time::Micros;
pub use transitions::{TransitionStatus, TransitionType};
pub use users::{User, ROLE_TRANSITION_USER};
