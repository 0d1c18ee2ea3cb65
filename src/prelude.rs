//! A set of exports for the types most programs touch.
//!
//! This allows for quick and easy access to everything needed to stand up a client:
//!
//! ```rust,no_run
//! use tempest::prelude::*;
//! ```

pub use crate::client::{Client, ClientBuilder, ShardPlan};
pub use crate::error::{Error, Result};
pub use crate::gateway::{
    ActivityData,
    ConnectionStage,
    GatewayError,
    PresenceData,
    ShardManager,
    Session,
};
pub use crate::model::event::{Event, EventType};
pub use crate::model::gateway::GatewayIntents;
pub use crate::model::id::ShardId;
pub use crate::model::user::OnlineStatus;
