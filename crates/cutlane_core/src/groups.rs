//! Linked groups: clips that move, trim and re-timeshift together.
//!
//! Groups live in a table on the [`Timeline`]; clips only carry the id of
//! their group. Every group-wide update runs through [`Timeline::propagate`],
//! which moves the group from `Idle` to `Propagating` for the duration of the
//! update and rejects a nested attempt on the same group.

use crate::error::{CoreError, Result};
use crate::types::*;
use uuid::Uuid;

impl Timeline {
    /// Link two or more unlinked clips. Returns the new group id.
    pub fn link_clips(&mut self, clip_ids: &[Uuid]) -> Result<Uuid> {
        let mut members: Vec<Uuid> = Vec::with_capacity(clip_ids.len());
        for &id in clip_ids {
            if self.clip(id)?.group.is_some() {
                return Err(CoreError::AlreadyLinked(id));
            }
            if !members.contains(&id) {
                members.push(id);
            }
        }
        if members.len() < 2 {
            return Err(CoreError::InvalidOperation(
                "a linked group needs at least two clips".into(),
            ));
        }

        let group_id = Uuid::new_v4();
        self.restore_group(group_id, &members)?;
        Ok(group_id)
    }

    /// Take a clip out of its group. A group left with fewer than two
    /// members is dissolved. Unlinked clips are left alone.
    pub fn unlink_clip(&mut self, clip_id: Uuid) -> Result<()> {
        let Some(group_id) = self.clip(clip_id)?.group else {
            return Ok(());
        };
        self.clip_mut(clip_id)?.group = None;
        let group = self.group_mut(group_id)?;
        group.members.retain(|m| *m != clip_id);
        if group.members.len() < 2 {
            self.dissolve_group(group_id)?;
        }
        Ok(())
    }

    /// Remove a group, severing every member's link. Returns the members.
    pub fn dissolve_group(&mut self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let pos = self
            .groups
            .iter()
            .position(|g| g.id == group_id)
            .ok_or(CoreError::GroupNotFound(group_id))?;
        let group = self.groups.remove(pos);
        for id in &group.members {
            if let Ok(clip) = self.clip_mut(*id) {
                clip.group = None;
            }
        }
        Ok(group.members)
    }

    pub fn group(&self, group_id: Uuid) -> Result<&LinkedGroup> {
        self.groups
            .iter()
            .find(|g| g.id == group_id)
            .ok_or(CoreError::GroupNotFound(group_id))
    }

    fn group_mut(&mut self, group_id: Uuid) -> Result<&mut LinkedGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or(CoreError::GroupNotFound(group_id))
    }

    /// The clips that move with `clip_id`: its group, or just itself.
    pub fn lockstep_members(&self, clip_id: Uuid) -> Result<Vec<Uuid>> {
        match self.clip(clip_id)?.group {
            Some(group_id) => Ok(self.group(group_id)?.members.clone()),
            None => Ok(vec![clip_id]),
        }
    }

    /// Run `update` as a group-wide update of `group_id`.
    ///
    /// Fails with [`CoreError::GroupBusy`] without calling `update` when the
    /// group is already propagating. The group returns to `Idle` afterwards
    /// whether or not `update` succeeded.
    pub fn propagate<F>(&mut self, group_id: Uuid, update: F) -> Result<()>
    where
        F: FnOnce(&mut Timeline) -> Result<()>,
    {
        let group = self.group_mut(group_id)?;
        if group.state == GroupState::Propagating {
            tracing::debug!(%group_id, "rejected nested group update");
            return Err(CoreError::GroupBusy(group_id));
        }
        group.state = GroupState::Propagating;

        let result = update(self);

        // the update may have dissolved the group
        if let Ok(group) = self.group_mut(group_id) {
            group.state = GroupState::Idle;
        }
        result
    }

    /// Apply `f` to `clip_id`, or to every member of its group inside one
    /// propagation.
    pub(crate) fn apply_lockstep<F>(&mut self, clip_id: Uuid, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Timeline, Uuid) -> Result<()>,
    {
        match self.clip(clip_id)?.group {
            Some(group_id) => self.propagate(group_id, |tl| {
                for member in tl.group(group_id)?.members.clone() {
                    f(tl, member)?;
                }
                Ok(())
            }),
            None => f(self, clip_id),
        }
    }

    /// Recreate (or replace) a group with a known id. Used by link and by
    /// undo of unlink/remove.
    pub(crate) fn restore_group(&mut self, group_id: Uuid, members: &[Uuid]) -> Result<()> {
        for id in members {
            self.clip(*id)?;
        }
        if self.group(group_id).is_ok() {
            self.dissolve_group(group_id)?;
        }
        for id in members {
            self.clip_mut(*id)?.group = Some(group_id);
        }
        self.groups.push(LinkedGroup {
            id: group_id,
            members: members.to_vec(),
            state: GroupState::Idle,
        });
        Ok(())
    }
}
