pub mod health;
pub mod matches;
pub mod messages;
pub mod notifications;
pub mod swipes;
