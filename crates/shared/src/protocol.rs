use serde::{Deserialize, Serialize};

use crate::domain::Item;

/// Request body for `POST <collection>` and `PUT <collection>/<id>`.
///
/// The identifier never travels in the body: the store assigns it on create
/// and takes it from the path on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBody {
    pub task: String,
    pub completed: bool,
}

impl From<&Item> for ItemBody {
    fn from(item: &Item) -> Self {
        Self {
            task: item.task.clone(),
            completed: item.completed,
        }
    }
}
