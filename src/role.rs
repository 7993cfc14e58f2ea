//! Role classification.
//!
//! Turns a [`ComponentRoleSpec`] into a [`RoleMap`] keyed by role label. The
//! map answers two questions for every observed label: which status slot the
//! replica belongs in ([`RoleKind`]) and how critical it is during an update
//! ([`RolePriority`]).

use std::collections::HashMap;

use crate::types::{AccessMode, ComponentRoleSpec, RoleSpec};

/// Status slot a role maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Leader,
    Follower,
    Learner,
    /// Empty label or a label no role defines.
    Unknown,
}

/// Update priority of a role. Lower priorities are replaced first.
///
/// Variants are declared in ascending order so the derived `Ord` agrees with
/// [`RolePriority::value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RolePriority {
    Unknown,
    Empty,
    Learner,
    FollowerNone,
    FollowerReadonly,
    FollowerReadWrite,
    Leader,
}

impl RolePriority {
    pub fn value(&self) -> u8 {
        match self {
            RolePriority::Unknown => 0,
            RolePriority::Empty => 1 << 0,
            RolePriority::Learner => 1 << 1,
            RolePriority::FollowerNone => 1 << 2,
            RolePriority::FollowerReadonly => 1 << 3,
            RolePriority::FollowerReadWrite => 1 << 4,
            RolePriority::Leader => 1 << 5,
        }
    }

    fn for_follower(access_mode: AccessMode) -> Self {
        match access_mode {
            AccessMode::None => RolePriority::FollowerNone,
            AccessMode::Readonly => RolePriority::FollowerReadonly,
            AccessMode::ReadWrite => RolePriority::FollowerReadWrite,
        }
    }
}

/// A role defined for the component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub name: String,
    pub kind: RoleKind,
    pub access_mode: AccessMode,
    pub priority: RolePriority,
}

/// Labels a replica should carry for a role it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLabels {
    pub role: String,
    pub access_mode: AccessMode,
}

/// Roles of one component, keyed by role label.
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    roles: HashMap<String, RoleInfo>,
}

impl RoleMap {
    /// Classify every role in `spec`.
    ///
    /// Entries are inserted leader, followers, learner; a later entry with the
    /// same name replaces the earlier one. Unnamed entries are skipped.
    pub fn classify(spec: &ComponentRoleSpec) -> Self {
        let mut map = Self::default();

        let leader = spec.leader_or_default();
        map.insert(&leader, RoleKind::Leader, RolePriority::Leader);

        for follower in &spec.followers {
            map.insert(
                follower,
                RoleKind::Follower,
                RolePriority::for_follower(follower.access_mode),
            );
        }

        if let Some(learner) = &spec.learner {
            map.insert(learner, RoleKind::Learner, RolePriority::Learner);
        }

        map
    }

    fn insert(&mut self, role: &RoleSpec, kind: RoleKind, priority: RolePriority) {
        if role.name.is_empty() {
            return;
        }
        self.roles.insert(
            role.name.clone(),
            RoleInfo {
                name: role.name.clone(),
                kind,
                access_mode: role.access_mode,
                priority,
            },
        );
    }

    /// The role defined for `label`, if any.
    pub fn get(&self, label: &str) -> Option<&RoleInfo> {
        self.roles.get(label)
    }

    pub fn kind(&self, label: &str) -> RoleKind {
        self.get(label).map_or(RoleKind::Unknown, |r| r.kind)
    }

    pub fn priority(&self, label: &str) -> RolePriority {
        match self.get(label) {
            Some(role) => role.priority,
            None if label.is_empty() => RolePriority::Empty,
            None => RolePriority::Unknown,
        }
    }

    /// Labels to apply when a replica reports `probed` as its role.
    ///
    /// Roles the component does not define yield `None` and must not be
    /// written to the replica.
    pub fn labels_for(&self, probed: &str) -> Option<RoleLabels> {
        self.get(probed).map(|role| RoleLabels {
            role: role.name.clone(),
            access_mode: role.access_mode,
        })
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
