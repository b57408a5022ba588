pub mod grouping;
pub mod ranking;
pub mod unread;

pub use grouping::{group_interactions, GroupedInteractions, SessionGroup};
pub use ranking::{rank_sessions, RankKey, ViewFilter};
pub use unread::UnreadCounter;
