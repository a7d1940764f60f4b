//! Entity models.

pub mod notification;
pub mod operation;
pub mod subscription;

pub use notification::{CreateNotification, Notification, NotificationKind, NotificationStatus};
pub use operation::{CreateOperation, Operation, OperationKind, OperationStatus};
pub use subscription::ClientSubscription;
