pub mod matchmaking;
pub mod messaging;
pub mod notifications;
