pub mod auth;
pub mod error;
pub mod gateway;
pub mod realtime;
pub mod rest;
pub mod supabase;

pub use auth::AuthClient;
pub use error::{GatewayError, Result};
pub use gateway::{DeliveryRequest, DenylistInsert, Gateway, SessionStateUpdate};
pub use realtime::{RealtimeConfig, RealtimeEvent, RealtimeSubscription};
pub use rest::RestClient;
pub use supabase::SupabaseGateway;
