use crate::error::{CoreError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The temporal fields of one clip, captured so an edit can be reverted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClipExtent {
    pub id: Uuid,
    pub start: Frames,
    pub in_point: Frames,
    pub out_point: Frames,
}

impl Timeline {
    pub fn new(frame_rate: FrameRate) -> Self {
        Self {
            frame_rate,
            assets: vec![],
            tracks: vec![],
            groups: vec![],
        }
    }

    /// Append a track on top of the existing ones. Returns its id.
    pub fn add_track(&mut self, kind: TrackKind) -> Uuid {
        let track = Track::new(kind);
        let id = track.id;
        self.tracks.push(track);
        id
    }

    pub fn add_asset(&mut self, asset: Asset) -> Uuid {
        let id = asset.id;
        self.assets.push(asset);
        id
    }

    pub fn asset(&self, asset_id: Uuid) -> Result<&Asset> {
        self.assets
            .iter()
            .find(|a| a.id == asset_id)
            .ok_or(CoreError::AssetNotFound(asset_id))
    }

    /// Usable source length of an asset in frames. Sub-assets report the
    /// length of the container they were split from when it is known.
    pub fn asset_duration(&self, asset_id: Uuid) -> Result<Frames> {
        let mut asset = self.asset(asset_id)?;
        // bounded walk: a malformed parent cycle must not hang
        for _ in 0..self.assets.len() {
            match asset
                .parent
                .and_then(|p| self.assets.iter().find(|a| a.id == p))
            {
                Some(parent) => asset = parent,
                None => break,
            }
        }
        Ok(self
            .frame_rate
            .quantize(asset.duration_us.as_seconds())
            .max(Frames::ZERO))
    }

    pub fn track(&self, track_id: Uuid) -> Result<&Track> {
        self.tracks
            .iter()
            .find(|t| t.id == track_id)
            .ok_or(CoreError::TrackNotFound(track_id))
    }

    pub fn track_index(&self, track_id: Uuid) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == track_id)
            .ok_or(CoreError::TrackNotFound(track_id))
    }

    pub fn clip(&self, clip_id: Uuid) -> Result<&Clip> {
        let (ti, ci) = self
            .find_clip_location(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        Ok(&self.tracks[ti].clips[ci])
    }

    pub(crate) fn clip_mut(&mut self, clip_id: Uuid) -> Result<&mut Clip> {
        let (ti, ci) = self
            .find_clip_location(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        Ok(&mut self.tracks[ti].clips[ci])
    }

    /// The track currently owning a clip.
    pub fn track_of(&self, clip_id: Uuid) -> Result<Uuid> {
        let (ti, _) = self
            .find_clip_location(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        Ok(self.tracks[ti].id)
    }

    /// Build an unplaced clip over `asset_id`. Positions are given in seconds
    /// and quantized down to the frame grid; trim points are clamped into the
    /// asset's usable range.
    pub fn new_clip(
        &self,
        asset_id: Uuid,
        start: f64,
        in_point: f64,
        out_point: f64,
    ) -> Result<Clip> {
        let fr = self.frame_rate;
        self.clip_for_asset(
            asset_id,
            fr.quantize(start),
            fr.quantize(in_point),
            fr.quantize(out_point),
        )
    }

    /// Same as [`Timeline::new_clip`] for values already on the frame grid.
    pub fn clip_for_asset(
        &self,
        asset_id: Uuid,
        start: Frames,
        in_point: Frames,
        out_point: Frames,
    ) -> Result<Clip> {
        let kind = self.asset(asset_id)?.kind;
        let limit = self.asset_duration(asset_id)?;
        let out_point = out_point.clamp(Frames::ZERO, limit);
        let in_point = in_point.clamp(Frames::ZERO, out_point);
        Ok(Clip {
            id: Uuid::new_v4(),
            asset_id,
            kind,
            start,
            in_point,
            out_point,
            timeshift: Frames::ZERO,
            group: None,
        })
    }

    /// Place a clip on a track. Rejects incompatible kinds and overlaps.
    pub fn add_clip(&mut self, track_id: Uuid, mut clip: Clip) -> Result<()> {
        if self.find_clip_location(clip.id).is_some() {
            return Err(CoreError::InvalidOperation(format!(
                "clip {} is already placed",
                clip.id
            )));
        }
        let ti = self.track_index(track_id)?;
        let track = &mut self.tracks[ti];
        if !track.kind.accepts(clip.kind) {
            return Err(CoreError::IncompatibleTrack {
                track: track.kind,
                asset: clip.kind,
            });
        }
        if track
            .clips
            .iter()
            .any(|c| c.overlaps(clip.start, clip.end()))
        {
            return Err(CoreError::OverlapDetected);
        }

        clip.timeshift = Frames::ZERO;
        clip.group = None;
        track.clips.push(clip);
        track.sort_clips();
        Ok(())
    }

    /// Remove a clip, severing any group link. Returns the removed clip.
    pub fn remove_clip(&mut self, clip_id: Uuid) -> Result<Clip> {
        if self.clip(clip_id)?.group.is_some() {
            self.unlink_clip(clip_id)?;
        }
        let (ti, ci) = self
            .find_clip_location(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        Ok(self.tracks[ti].clips.remove(ci))
    }

    /// Transfer a clip to another track at a new start. Linked members follow
    /// the time change but stay on their own tracks.
    ///
    /// Every member's new extent is checked before anything changes: a move
    /// that would overlap another clip on any affected track fails with
    /// [`CoreError::OverlapDetected`] and leaves the timeline untouched.
    pub fn move_clip_to_track(&mut self, clip_id: Uuid, track_id: Uuid, start: f64) -> Result<()> {
        let (ti, ci) = self
            .find_clip_location(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        let dest = self.track_index(track_id)?;

        let clip = &self.tracks[ti].clips[ci];
        let delta = self.frame_rate.quantize(start) - clip.start;
        let dest_track = &self.tracks[dest];
        if !dest_track.kind.accepts(clip.kind) {
            return Err(CoreError::IncompatibleTrack {
                track: dest_track.kind,
                asset: clip.kind,
            });
        }
        if let Some(group_id) = clip.group {
            if self.group(group_id)?.state == GroupState::Propagating {
                return Err(CoreError::GroupBusy(group_id));
            }
        }

        // (track index, start, end) of every member after the move
        let members = self.lockstep_members(clip_id)?;
        let mut planned = Vec::with_capacity(members.len());
        for &id in &members {
            let (mti, mci) = self
                .find_clip_location(id)
                .ok_or(CoreError::ClipNotFound(id))?;
            let m = &self.tracks[mti].clips[mci];
            let track = if id == clip_id { dest } else { mti };
            planned.push((track, m.start + delta, m.end() + delta));
        }
        for (i, &(track, start, end)) in planned.iter().enumerate() {
            let hits_bystander = self.tracks[track]
                .clips
                .iter()
                .any(|c| !members.contains(&c.id) && c.overlaps(start, end));
            let hits_member = planned[..i]
                .iter()
                .any(|&(t, s, e)| t == track && s < end && start < e);
            if hits_bystander || hits_member {
                return Err(CoreError::OverlapDetected);
            }
        }

        let clip = self.tracks[ti].clips.remove(ci);
        self.tracks[dest].clips.push(clip);
        self.shift_lockstep(clip_id, delta)
    }

    /// Split a clip strictly inside its extent. The left half keeps the id
    /// and group link; the right half is a new, unlinked clip.
    pub fn split_at(&mut self, clip_id: Uuid, at: f64) -> Result<(Uuid, Uuid)> {
        let at = self.frame_rate.quantize(at);
        let (ti, ci) = self
            .find_clip_location(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;

        let clip = &mut self.tracks[ti].clips[ci];
        if at <= clip.start || at >= clip.end() {
            return Err(CoreError::InvalidOperation(
                "split position must be strictly between clip start and end".into(),
            ));
        }

        let offset = at - clip.start;
        let mut right = clip.clone();
        right.id = Uuid::new_v4();
        right.start = at;
        right.in_point = clip.in_point + offset;
        right.timeshift = Frames::ZERO;
        right.group = None;
        clip.out_point = clip.in_point + offset;

        let right_id = right.id;
        self.tracks[ti].clips.insert(ci + 1, right);
        Ok((clip_id, right_id))
    }

    /// Move a clip to `seconds` (quantized). Linked members shift by the same
    /// delta so their relative offsets are preserved exactly.
    pub fn set_start_time(&mut self, clip_id: Uuid, seconds: f64) -> Result<()> {
        let target = self.frame_rate.quantize(seconds);
        let delta = target - self.clip(clip_id)?.start;
        self.shift_lockstep(clip_id, delta)
    }

    /// Set the source in-point, clamped into `[0, out_point]`. Linked
    /// members receive the same absolute value.
    pub fn set_in_point(&mut self, clip_id: Uuid, seconds: f64) -> Result<()> {
        let value = self.frame_rate.quantize(seconds);
        self.apply_lockstep(clip_id, |tl, id| {
            let clip = tl.clip_mut(id)?;
            clip.in_point = value.clamp(Frames::ZERO, clip.out_point);
            Ok(())
        })
    }

    /// Set the source out-point, clamped into `[in_point, asset duration]`.
    /// Linked members receive the same absolute value.
    pub fn set_out_point(&mut self, clip_id: Uuid, seconds: f64) -> Result<()> {
        let value = self.frame_rate.quantize(seconds);
        self.apply_lockstep(clip_id, |tl, id| {
            let limit = tl.asset_duration(tl.clip(id)?.asset_id)?;
            let clip = tl.clip_mut(id)?;
            clip.out_point = value.min(limit).max(clip.in_point);
            Ok(())
        })
    }

    /// Set the transient drag-preview displacement of a clip and its group.
    pub fn set_timeshift(&mut self, clip_id: Uuid, seconds: f64) -> Result<()> {
        let shift = self.frame_rate.quantize(seconds);
        self.apply_lockstep(clip_id, |tl, id| {
            tl.clip_mut(id)?.timeshift = shift;
            Ok(())
        })
    }

    /// Fold the pending timeshift of a clip (and its group) into its start.
    pub fn commit_timeshift(&mut self, clip_id: Uuid) -> Result<()> {
        self.apply_lockstep(clip_id, |tl, id| {
            let clip = tl.clip_mut(id)?;
            clip.start += clip.timeshift;
            clip.timeshift = Frames::ZERO;
            Ok(())
        })?;
        self.sort_all_tracks();
        Ok(())
    }

    pub fn clear_timeshifts(&mut self) {
        for clip in self.tracks.iter_mut().flat_map(|t| t.clips.iter_mut()) {
            clip.timeshift = Frames::ZERO;
        }
    }

    /// End of the last clip on any track.
    pub fn total_duration(&self) -> Frames {
        self.tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .map(Clip::end)
            .max()
            .unwrap_or(Frames::ZERO)
            .max(Frames::ZERO)
    }

    /// Snapshot of every clip's temporal fields.
    pub fn extents(&self) -> Vec<ClipExtent> {
        self.tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .map(|c| ClipExtent {
                id: c.id,
                start: c.start,
                in_point: c.in_point,
                out_point: c.out_point,
            })
            .collect()
    }

    /// Put back a snapshot taken by [`Timeline::extents`]. Clips that no
    /// longer exist are skipped.
    pub fn restore_extents(&mut self, extents: &[ClipExtent]) {
        for extent in extents {
            if let Ok(clip) = self.clip_mut(extent.id) {
                clip.start = extent.start;
                clip.in_point = extent.in_point;
                clip.out_point = extent.out_point;
            }
        }
        self.sort_all_tracks();
    }

    pub(crate) fn shift_lockstep(&mut self, clip_id: Uuid, delta: Frames) -> Result<()> {
        self.apply_lockstep(clip_id, |tl, id| {
            tl.clip_mut(id)?.start += delta;
            Ok(())
        })?;
        self.sort_all_tracks();
        Ok(())
    }

    /// Move a clip onto another track as-is. No compatibility or overlap
    /// checks; used to revert a checked move.
    pub(crate) fn transfer_clip(&mut self, clip_id: Uuid, track_id: Uuid) -> Result<()> {
        let dest = self.track_index(track_id)?;
        let (ti, ci) = self
            .find_clip_location(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        if ti != dest {
            let clip = self.tracks[ti].clips.remove(ci);
            self.tracks[dest].clips.push(clip);
            self.tracks[dest].sort_clips();
        }
        Ok(())
    }

    pub(crate) fn sort_all_tracks(&mut self) {
        for track in &mut self.tracks {
            track.sort_clips();
        }
    }

    /// Find the (track_index, clip_index) for a given clip id.
    pub(crate) fn find_clip_location(&self, clip_id: Uuid) -> Option<(usize, usize)> {
        for (ti, track) in self.tracks.iter().enumerate() {
            if let Some(ci) = track.clips.iter().position(|c| c.id == clip_id) {
                return Some((ti, ci));
            }
        }
        None
    }
}
