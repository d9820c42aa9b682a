// 👤 Member Entity - borrower belonging to exactly one center

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub center_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Member {
    pub fn member_ref(&self) -> crate::error::MemberRef {
        crate::error::MemberRef {
            member_id: self.id,
            name: self.name.clone(),
        }
    }
}
