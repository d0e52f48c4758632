use std::collections::HashSet;

use crate::{
    domain::{GroupId, UserId},
    messaging::port::ChatPlatform,
};

// ============== Authorization ==============

/// Optional allow-list restricting who may forward threads.
///
/// Empty on both axes means the gate is off and everyone is permitted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowList {
    users: HashSet<UserId>,
    groups: Vec<GroupId>,
}

impl AllowList {
    pub fn new(
        users: impl IntoIterator<Item = UserId>,
        groups: impl IntoIterator<Item = GroupId>,
    ) -> Self {
        let mut seen = HashSet::new();
        let groups = groups
            .into_iter()
            .filter(|g| seen.insert(g.clone()))
            .collect();
        Self {
            users: users.into_iter().collect(),
            groups,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.users.is_empty() || !self.groups.is_empty()
    }

    pub fn lists_user(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }

    /// Groups in configured order (lookups happen in this order).
    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Whether `user` may trigger a forward.
    ///
    /// Direct listing is checked first and needs no platform calls. Groups are
    /// then resolved one at a time, stopping at the first that contains the
    /// user. A failed lookup only rules out that group.
    pub async fn permits(&self, user: &UserId, platform: &dyn ChatPlatform) -> bool {
        if !self.is_configured() || self.lists_user(user) {
            return true;
        }

        for group in &self.groups {
            match platform.list_group_members(group).await {
                Ok(members) if members.contains(user) => {
                    tracing::debug!(%user, %group, "user authorized via group membership");
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(%group, error = %e, "group membership lookup failed; skipping group");
                }
            }
        }

        false
    }
}
