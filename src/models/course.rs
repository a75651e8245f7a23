use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A purchasable course. `price` is expressed in whole store units (e.g. rupees).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    pub price: u64,
    /// Students holding an enrollment; set semantics, a user appears at most once.
    pub enrolled_students: BTreeSet<Uuid>,
}

impl Course {
    pub fn new(name: impl Into<String>, price: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            enrolled_students: BTreeSet::new(),
        }
    }

    pub fn is_enrolled(&self, user_id: Uuid) -> bool {
        self.enrolled_students.contains(&user_id)
    }
}
