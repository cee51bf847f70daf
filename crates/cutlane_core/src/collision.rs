//! Overlap resolution for interactive edits.
//!
//! Resolution is a greedy, rightward sweep over one track: the clip after
//! the edited one is pushed forward by exactly the overlap amount, and the
//! push cascades until the track is clean. A drag gesture remembers where
//! every clip started so that, once the gesture ends, pushed clips can be
//! pulled back as far as their predecessor allows.
//!
//! Displacement here is per clip: a pushed clip's linked companions on
//! other tracks are not dragged along.

use crate::error::{CoreError, Result};
use crate::types::*;
use std::collections::HashMap;
use uuid::Uuid;

/// State of an in-progress drag gesture.
#[derive(Debug, Clone)]
pub struct DragSession {
    trigger: Uuid,
    /// The trigger and its linked companions; never pulled back.
    anchors: Vec<Uuid>,
    tracks: Vec<Uuid>,
    origins: HashMap<Uuid, Frames>,
}

impl DragSession {
    pub fn trigger(&self) -> Uuid {
        self.trigger
    }

    pub fn origin(&self, clip_id: Uuid) -> Option<Frames> {
        self.origins.get(&clip_id).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimEdge {
    In,
    Out,
}

/// A pending drop of a new clip onto a track.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionPreview {
    pub track_id: Uuid,
    pub start: Frames,
    pub duration: Frames,
    /// Forward displacement of each downstream clip, mirrored in its
    /// timeshift until the drop is committed or cancelled.
    pub displacements: Vec<(Uuid, Frames)>,
}

/// Sweep order for a track: by start, with `trigger` ahead of every clip it
/// overlaps so neighbours move and the trigger stays put.
fn sweep_order(clips: &[Clip], trigger: Uuid) -> Vec<usize> {
    let mut order: Vec<usize> = (0..clips.len())
        .filter(|&i| clips[i].id != trigger)
        .collect();
    order.sort_by_key(|&i| (clips[i].start, clips[i].end()));
    if let Some(t) = clips.iter().position(|c| c.id == trigger) {
        let t_start = clips[t].start;
        let at = order
            .iter()
            .position(|&i| clips[i].end() > t_start)
            .unwrap_or(order.len());
        order.insert(at, t);
    }
    order
}

/// One pass over the sweep order. Each clip is pushed to the end of the one
/// before it when they overlap, so the pass terminates after `n` steps and
/// leaves the track pairwise non-overlapping.
fn push_forward(track: &mut Track, trigger: Uuid) -> Vec<Uuid> {
    let order = sweep_order(&track.clips, trigger);
    let mut pushed = Vec::new();
    let mut prev_end: Option<Frames> = None;
    for &i in &order {
        let clip = &mut track.clips[i];
        if let Some(end) = prev_end {
            if clip.start < end {
                clip.start = end;
                pushed.push(clip.id);
            }
        }
        prev_end = Some(clip.end());
    }

    let mut slots: Vec<Option<Clip>> = std::mem::take(&mut track.clips)
        .into_iter()
        .map(Some)
        .collect();
    track.clips = order.iter().filter_map(|&i| slots[i].take()).collect();
    pushed
}

impl Timeline {
    /// Start a drag gesture on `clip_id`. Records the position of every clip
    /// on the tracks the clip and its linked companions live on.
    pub fn begin_drag(&self, clip_id: Uuid) -> Result<DragSession> {
        let anchors = self.lockstep_members(clip_id)?;
        let mut tracks = Vec::new();
        for &id in &anchors {
            let track_id = self.track_of(id)?;
            if !tracks.contains(&track_id) {
                tracks.push(track_id);
            }
        }
        let mut origins = HashMap::new();
        for &track_id in &tracks {
            for clip in &self.track(track_id)?.clips {
                origins.insert(clip.id, clip.start);
            }
        }
        Ok(DragSession {
            trigger: clip_id,
            anchors,
            tracks,
            origins,
        })
    }

    /// Move the dragged clip (and its group) and resolve every touched track.
    pub fn drag_to(&mut self, session: &DragSession, seconds: f64) -> Result<()> {
        self.set_start_time(session.trigger, seconds)?;
        for &id in &session.anchors {
            self.resolve_collisions(id)?;
        }
        Ok(())
    }

    /// Push the neighbours of `clip_id` forward until its track has no
    /// overlaps. Returns the clips that moved.
    pub fn resolve_collisions(&mut self, clip_id: Uuid) -> Result<Vec<Uuid>> {
        let (ti, _) = self
            .find_clip_location(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        let pushed = push_forward(&mut self.tracks[ti], clip_id);
        if !pushed.is_empty() {
            tracing::debug!(%clip_id, pushed = pushed.len(), "resolved collisions");
        }
        Ok(pushed)
    }

    /// Finish a drag gesture. Every clip pushed during it is pulled back
    /// toward its pre-gesture start, bounded below by the end of its
    /// (possibly also adjusted) predecessor. Returns the clips that moved.
    pub fn end_drag(&mut self, session: DragSession) -> Result<Vec<Uuid>> {
        let mut pulled = Vec::new();
        for track_id in &session.tracks {
            let ti = self.track_index(*track_id)?;
            let track = &mut self.tracks[ti];
            track.sort_clips();

            let mut prev_end: Option<Frames> = None;
            for clip in &mut track.clips {
                let origin = session.origins.get(&clip.id).copied();
                if let Some(origin) = origin.filter(|o| clip.start > *o) {
                    if !session.anchors.contains(&clip.id) {
                        let floor = prev_end.map_or(origin, |end| end.max(origin));
                        if floor < clip.start {
                            clip.start = floor;
                            pulled.push(clip.id);
                        }
                    }
                }
                prev_end = Some(clip.end());
            }
        }
        Ok(pulled)
    }

    /// A complete move gesture in one call: lockstep move, resolution on
    /// every touched track, then pull-back.
    pub fn move_clip(&mut self, clip_id: Uuid, seconds: f64) -> Result<()> {
        let session = self.begin_drag(clip_id)?;
        self.drag_to(&session, seconds)?;
        self.end_drag(session)?;
        Ok(())
    }

    /// A complete trim gesture: lockstep trim of one edge, then resolution
    /// of any overlap the longer extent created.
    pub fn trim_clip(&mut self, clip_id: Uuid, edge: TrimEdge, seconds: f64) -> Result<()> {
        let session = self.begin_drag(clip_id)?;
        match edge {
            TrimEdge::In => self.set_in_point(clip_id, seconds)?,
            TrimEdge::Out => self.set_out_point(clip_id, seconds)?,
        }
        for &id in &session.anchors {
            self.resolve_collisions(id)?;
        }
        self.end_drag(session)?;
        Ok(())
    }

    /// Preview dropping a new clip of `kind` and `duration` seconds at
    /// `drop_at` on a track.
    ///
    /// The drop snaps to the end of the first existing clip it would
    /// overlap; clips downstream of the new clip's end are displaced
    /// forward through their timeshift only. Nothing is committed.
    pub fn preview_insertion(
        &mut self,
        track_id: Uuid,
        kind: AssetKind,
        duration: f64,
        drop_at: f64,
    ) -> Result<InsertionPreview> {
        let fr = self.frame_rate;
        let ti = self.track_index(track_id)?;
        let track = &mut self.tracks[ti];
        if !track.kind.accepts(kind) {
            return Err(CoreError::IncompatibleTrack {
                track: track.kind,
                asset: kind,
            });
        }
        for clip in &mut track.clips {
            clip.timeshift = Frames::ZERO;
        }
        track.sort_clips();

        let duration = fr.quantize(duration).max(Frames::ZERO);
        let mut start = fr.quantize(drop_at);
        if let Some(hit) = track
            .clips
            .iter()
            .find(|c| c.overlaps(start, start + duration))
        {
            tracing::debug!(clip = %hit.id, "drop snapped past existing clip");
            start = hit.end();
        }

        let mut displacements = Vec::new();
        let mut prev_end = start + duration;
        for clip in track.clips.iter_mut().filter(|c| c.start >= start) {
            let shifted = clip.start.max(prev_end);
            let shift = shifted - clip.start;
            if shift.is_positive() {
                clip.timeshift = shift;
                displacements.push((clip.id, shift));
            }
            prev_end = shifted + clip.duration();
        }

        Ok(InsertionPreview {
            track_id,
            start,
            duration,
            displacements,
        })
    }

    /// Drop a pending insertion preview.
    pub fn cancel_insertion(&mut self, preview: &InsertionPreview) -> Result<()> {
        let ti = self.track_index(preview.track_id)?;
        for clip in &mut self.tracks[ti].clips {
            clip.timeshift = Frames::ZERO;
        }
        Ok(())
    }

    /// Apply a preview's displacements and place `clip` at its start, as one
    /// step. On failure the displacements are rolled back.
    pub fn commit_insertion(&mut self, preview: &InsertionPreview, mut clip: Clip) -> Result<()> {
        let ti = self.track_index(preview.track_id)?;
        let kind = self.tracks[ti].kind;
        if !kind.accepts(clip.kind) {
            return Err(CoreError::IncompatibleTrack {
                track: kind,
                asset: clip.kind,
            });
        }

        self.cancel_insertion(preview)?;
        for &(id, shift) in &preview.displacements {
            self.clip_mut(id)?.start += shift;
        }

        clip.start = preview.start;
        if let Err(e) = self.add_clip(preview.track_id, clip) {
            for &(id, shift) in &preview.displacements {
                if let Ok(c) = self.clip_mut(id) {
                    c.start -= shift;
                }
            }
            self.sort_all_tracks();
            return Err(e);
        }
        self.sort_all_tracks();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::tests::{fixture, place};

    fn starts(tl: &Timeline, track: Uuid) -> Vec<i64> {
        tl.track(track).unwrap().clips.iter().map(|c| c.start.0).collect()
    }

    fn assert_no_overlaps(tl: &Timeline, track: Uuid) {
        let mut clips: Vec<&Clip> = tl.track(track).unwrap().clips.iter().collect();
        clips.sort_by_key(|c| c.start);
        for pair in clips.windows(2) {
            assert!(
                pair[0].end() <= pair[1].start,
                "overlap between {:?} and {:?}",
                (pair[0].start, pair[0].end()),
                (pair[1].start, pair[1].end())
            );
        }
    }

    /// A [0,2) B [2,4) C [5,7) on one video track.
    fn three_clips() -> (Timeline, Uuid, [Uuid; 3]) {
        let (mut tl, video, _, asset) = fixture();
        let a = place(&mut tl, video, asset, 0.0, 2.0);
        let b = place(&mut tl, video, asset, 2.0, 2.0);
        let c = place(&mut tl, video, asset, 5.0, 2.0);
        (tl, video, [a, b, c])
    }

    // -----------------------------------------------------------------------
    // push_forward
    // -----------------------------------------------------------------------

    #[test]
    fn push_moves_neighbour_by_exact_overlap() {
        let (mut tl, video, [a, b, _]) = three_clips();
        tl.set_start_time(a, 1.0).unwrap();
        let pushed = tl.resolve_collisions(a).unwrap();
        assert_eq!(pushed, vec![b]);
        assert_eq!(starts(&tl, video), vec![30, 90, 150]);
    }

    #[test]
    fn push_cascades_until_clean() {
        let (mut tl, video, [a, b, c]) = three_clips();
        tl.set_start_time(a, 1.5).unwrap();
        let pushed = tl.resolve_collisions(a).unwrap();
        assert_eq!(pushed, vec![b, c]);
        assert_eq!(starts(&tl, video), vec![45, 105, 165]);
        assert_no_overlaps(&tl, video);
    }

    #[test]
    fn trigger_stays_put_when_landing_inside_predecessor() {
        let (mut tl, video, [a, _, c]) = three_clips();
        // C lands inside A
        tl.set_start_time(c, 1.0).unwrap();
        tl.resolve_collisions(c).unwrap();
        assert_eq!(tl.clip(c).unwrap().start, Frames(30));
        assert_eq!(tl.clip(a).unwrap().start, Frames(90));
        assert_no_overlaps(&tl, video);
    }

    #[test]
    fn resolution_always_leaves_track_clean() {
        // deterministic LCG so the sweep is exercised on many layouts
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |bound: u64| {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (seed >> 33) % bound
        };

        for _ in 0..200 {
            let (mut tl, video, _, asset) = fixture();
            let mut ids = Vec::new();
            let mut cursor = 0.0;
            for _ in 0..(2 + next(8)) {
                cursor += next(3) as f64;
                let len = 0.5 + next(4) as f64;
                ids.push(place(&mut tl, video, asset, cursor, len));
                cursor += len;
            }
            let target = ids[next(ids.len() as u64) as usize];
            tl.set_start_time(target, next(20) as f64 * 0.5).unwrap();
            tl.resolve_collisions(target).unwrap();
            assert_no_overlaps(&tl, video);
        }
    }

    // -----------------------------------------------------------------------
    // drag sessions
    // -----------------------------------------------------------------------

    #[test]
    fn end_drag_pulls_pushed_clips_back_to_origin() {
        let (mut tl, video, [a, b, c]) = three_clips();
        let session = tl.begin_drag(a).unwrap();
        tl.drag_to(&session, 2.0).unwrap();
        assert_eq!(starts(&tl, video), vec![60, 120, 180]);

        tl.drag_to(&session, 0.0).unwrap();
        let pulled = tl.end_drag(session).unwrap();
        assert_eq!(pulled, vec![b, c]);
        assert_eq!(starts(&tl, video), vec![0, 60, 150]);
        assert_eq!(tl.clip(a).unwrap().start, Frames(0));
    }

    #[test]
    fn end_drag_pull_back_is_bounded_by_predecessor() {
        let (mut tl, video, [a, b, _]) = three_clips();
        let session = tl.begin_drag(a).unwrap();
        tl.drag_to(&session, 2.5).unwrap();
        tl.drag_to(&session, 1.0).unwrap();
        tl.end_drag(session).unwrap();
        // B can only return as far as A's end
        assert_eq!(tl.clip(b).unwrap().start, Frames(90));
        assert_eq!(starts(&tl, video), vec![30, 90, 150]);
        assert_no_overlaps(&tl, video);
    }

    #[test]
    fn move_clip_resolves_linked_tracks() {
        let (mut tl, video, audio, asset) = fixture();
        let sound = tl.add_asset(Asset::new("/media/a.wav", AssetKind::Audio, 10.0));
        let v = place(&mut tl, video, asset, 0.0, 2.0);
        let a = place(&mut tl, audio, sound, 0.0, 2.0);
        let other = place(&mut tl, audio, sound, 3.0, 2.0);
        tl.link_clips(&[v, a]).unwrap();

        tl.move_clip(v, 2.0).unwrap();
        assert_eq!(tl.clip(v).unwrap().start, Frames(60));
        assert_eq!(tl.clip(a).unwrap().start, Frames(60));
        assert_eq!(tl.clip(other).unwrap().start, Frames(120));
        assert_no_overlaps(&tl, audio);
    }

    #[test]
    fn trim_out_pushes_following_clip() {
        let (mut tl, video, [a, b, _]) = three_clips();
        tl.trim_clip(a, TrimEdge::Out, 3.0).unwrap();
        assert_eq!(tl.clip(a).unwrap().end(), Frames(90));
        assert_eq!(tl.clip(b).unwrap().start, Frames(90));
        assert_no_overlaps(&tl, video);
    }

    // -----------------------------------------------------------------------
    // drag insertion
    // -----------------------------------------------------------------------

    #[test]
    fn drop_snaps_past_overlapped_clip() {
        let (mut tl, video, _, asset) = fixture();
        place(&mut tl, video, asset, 1.0, 3.0);
        let preview = tl
            .preview_insertion(video, AssetKind::Video, 3.0, 2.0)
            .unwrap();
        assert_eq!(preview.start, Frames(120));
        assert_eq!(tl.frame_rate.seconds(preview.start), 4.0);
        assert!(preview.displacements.is_empty());
    }

    #[test]
    fn drop_without_overlap_keeps_position() {
        let (mut tl, video, _, asset) = fixture();
        place(&mut tl, video, asset, 5.0, 1.0);
        let preview = tl
            .preview_insertion(video, AssetKind::Image, 2.0, 1.0)
            .unwrap();
        assert_eq!(preview.start, Frames(30));
        assert!(preview.displacements.is_empty());
    }

    #[test]
    fn drop_displaces_downstream_clips_through_timeshift_only() {
        let (mut tl, video, _, asset) = fixture();
        place(&mut tl, video, asset, 1.0, 3.0);
        let d = place(&mut tl, video, asset, 5.0, 3.0);
        let e = place(&mut tl, video, asset, 8.5, 1.0);

        let preview = tl
            .preview_insertion(video, AssetKind::Video, 3.0, 2.0)
            .unwrap();
        assert_eq!(preview.start, Frames(120));
        assert_eq!(preview.displacements, vec![(d, Frames(60)), (e, Frames(45))]);
        // committed positions are untouched
        assert_eq!(tl.clip(d).unwrap().start, Frames(150));
        assert_eq!(tl.clip(d).unwrap().shifted_start(), Frames(210));

        tl.cancel_insertion(&preview).unwrap();
        assert_eq!(tl.clip(d).unwrap().timeshift, Frames::ZERO);
    }

    #[test]
    fn commit_insertion_applies_displacement_and_places_clip() {
        let (mut tl, video, _, asset) = fixture();
        place(&mut tl, video, asset, 1.0, 3.0);
        let d = place(&mut tl, video, asset, 5.0, 3.0);

        let preview = tl
            .preview_insertion(video, AssetKind::Video, 3.0, 2.0)
            .unwrap();
        let clip = tl.new_clip(asset, 0.0, 0.0, 3.0).unwrap();
        let new_id = clip.id;
        tl.commit_insertion(&preview, clip).unwrap();

        assert_eq!(tl.clip(new_id).unwrap().start, Frames(120));
        assert_eq!(tl.clip(d).unwrap().start, Frames(210));
        assert_eq!(tl.clip(d).unwrap().timeshift, Frames::ZERO);
        assert_no_overlaps(&tl, video);
    }

    #[test]
    fn drop_of_incompatible_kind_is_rejected() {
        let (mut tl, video, audio, _) = fixture();
        assert!(matches!(
            tl.preview_insertion(video, AssetKind::Audio, 1.0, 0.0),
            Err(CoreError::IncompatibleTrack { .. })
        ));
        assert!(tl
            .preview_insertion(audio, AssetKind::Image, 1.0, 0.0)
            .is_err());
    }
}
