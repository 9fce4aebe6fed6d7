//! Wire-level push event names. These are part of the client contract and
//! must not change without a coordinated client release.

pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
pub const MESSAGES_READ: &str = "MessagesReadNotification";
pub const NOTIFY_TYPING: &str = "NotifyTyping";
pub const NOTIFY_STOPPED_TYPING: &str = "NotifyStoppedTyping";
pub const USER_STATUS_CHANGED: &str = "UserStatusChanged";
pub const RECEIVE_NOTIFICATION: &str = "ReceiveNotification";
