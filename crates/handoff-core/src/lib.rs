pub mod dashboard;
pub mod domain;
pub mod dto;
pub mod error;
pub mod reducer;
pub mod rules;
pub mod time;

pub use dashboard::{
    ChangeEffect, Dashboard, Notification, NotificationLevel, PendingAction, SendCompletion,
};
pub use domain::*;
pub use dto::*;
pub use error::CoreError;
pub use reducer::{RollbackOutcome, SessionStates, Snapshot};
pub use rules::*;
