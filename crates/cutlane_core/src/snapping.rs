use crate::types::*;

/// Find the nearest snap point within the threshold.
/// Returns the snapped position if within threshold, otherwise the original position.
pub fn find_snap_point(position: Frames, snap_points: &[Frames], threshold: Frames) -> Frames {
    let mut best = position;
    let mut best_dist = threshold.0 + 1; // start beyond threshold

    for &point in snap_points {
        let dist = (position.0 - point.0).abs();
        if dist < best_dist {
            best = point;
            best_dist = dist;
        }
    }

    if best_dist <= threshold.0 {
        best
    } else {
        position
    }
}

/// Collect all snap points from a timeline: zero and every clip edge.
///
/// When `exclude_clip_id` is set, the edges of that clip and of every clip
/// linked to it are left out, so a dragged group never snaps to itself.
pub fn collect_snap_points(timeline: &Timeline, exclude_clip_id: Option<uuid::Uuid>) -> Vec<Frames> {
    let excluded = exclude_clip_id
        .and_then(|id| timeline.lockstep_members(id).ok())
        .unwrap_or_default();

    let mut points = vec![Frames::ZERO];
    for track in &timeline.tracks {
        for clip in &track.clips {
            if excluded.contains(&clip.id) {
                continue;
            }
            points.push(clip.start);
            points.push(clip.end());
        }
    }

    points.sort();
    points.dedup();
    points
}
