use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

macro_rules! num_id {
    ($(#[$meta:meta])* $id:ident, $t:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $id($t);

        impl $id {
            /// Random value.
            pub fn new() -> Self {
                $id(fastrand::$t(..))
            }
        }

        impl Deref for $id {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$t> for $id {
            fn from(v: $t) -> Self {
                $id(v)
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

num_id!(
    /// Synchronization source identifier. A 32 bit stream id.
    Ssrc,
    u32
);

num_id!(
    /// Handle of a send stream created through a [`StreamManager`][crate::StreamManager].
    SendStreamId,
    u32
);

num_id!(
    /// Key a multi-party translator uses to tell its participating streams apart.
    StreamKey,
    u64
);
