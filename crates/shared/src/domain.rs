use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Opaque application value carried through state, params and context.
pub type Term = serde_json::Value;

/// Ordered key/value map used for action params and emitted context.
pub type Params = BTreeMap<String, Term>;

macro_rules! name_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

name_newtype!(ComponentId);
name_newtype!(ModuleRef);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    InFlight,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventPosition {
    pub page_x: i64,
    pub page_y: i64,
}

impl EventPosition {
    pub fn to_term(self) -> Term {
        serde_json::json!({ "page_x": self.page_x, "page_y": self.page_y })
    }
}
