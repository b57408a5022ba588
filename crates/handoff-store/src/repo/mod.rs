pub mod auth_session;
pub mod unread;

pub use auth_session::AuthSessionRepo;
pub use unread::UnreadRepo;
