use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a scheduled task
    TaskId
);

uuid_id!(
    /// Unique identifier for one execution attempt of a task
    ExecutionId
);

uuid_id!(
    /// Groups the attempts that belong to one logical task run
    RunId
);

uuid_id!(
    /// Unique identifier for a monitoring alert
    AlertId
);

uuid_id!(
    /// Unique identifier for a crawl session
    SessionId
);

uuid_id!(
    /// Unique identifier for an in-flight timing measurement
    TimingId
);
