use std::fmt;

use serde::{Deserialize, Serialize};

/// Turn counter, 1-based and monotonic.
pub type Turn = u32;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Stable player identity, assigned at session build time.
    PlayerId
);
id_newtype!(
    /// Faction identity, assigned at session build time.
    FactionId
);
id_newtype!(
    /// Declared action capability, immutable after build.
    ActionId
);
id_newtype!(
    /// Shared submission slot: multiple players holding one grant
    /// coordinate through the same group without double-submission.
    ActionGroupId
);
