use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use uuid::Uuid;

use crate::ports::member::{Error, Member, MemberPort};

/// In-memory member directory
#[derive(Clone, Debug, Default)]
pub struct MemoryMemberDirectory {
    members: Arc<RwLock<HashMap<Uuid, Member>>>,
}

impl MemoryMemberDirectory {
    pub fn insert(&self, member: Member) {
        self.members
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(member.member_id, member);
    }

    pub fn remove(&self, member_id: Uuid) -> Option<Member> {
        self.members
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&member_id)
    }
}

#[async_trait::async_trait]
impl MemberPort for MemoryMemberDirectory {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, Error> {
        self.members
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&member_id)
            .cloned()
            .ok_or(Error::MemberDoesNotExist(member_id))
    }
}
