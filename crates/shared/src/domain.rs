use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ItemId);

impl ItemId {
    /// Provisional identifier handed out when the local collection is empty.
    pub const PROVISIONAL_SEED: ItemId = ItemId(0);

    /// The identifier after this one, or `None` at the top of the range.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

/// A single task record as the store represents it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub task: String,
    #[serde(default)]
    pub completed: bool,
}

impl Item {
    pub fn new(id: ItemId, task: impl Into<String>) -> Self {
        Self {
            id,
            task: task.into(),
            completed: false,
        }
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Copy of this item with new text. Editing the text always clears completion.
    pub fn retitled(&self, task: impl Into<String>) -> Self {
        Self {
            id: self.id,
            task: task.into(),
            completed: false,
        }
    }
}
