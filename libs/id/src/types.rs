//! Typed ID definitions for every persisted record.

use crate::define_id;

define_id!(UserId, "user id");
define_id!(PoolId, "task pool id");
define_id!(TaskId, "task id");
define_id!(DeviceTokenId, "device token id");
define_id!(NotificationId, "notification id");
