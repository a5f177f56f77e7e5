use serde::{Deserialize, Serialize};

/// Numeric bounds the eligibility rules enforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityPolicy {
    pub max_borrower_groups: usize,
    pub min_group_members: usize,
    pub max_group_members: usize,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            max_borrower_groups: 4,
            min_group_members: 5,
            max_group_members: 1000,
        }
    }
}
