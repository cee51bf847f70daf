use crate::collision::{InsertionPreview, TrimEdge};
use crate::editing::ClipExtent;
use crate::error::{CoreError, Result};
use crate::types::*;
use uuid::Uuid;

/// A command that can be executed, undone, and described.
///
/// Commands record whatever they need for their inverse while executing, so
/// redo simply executes again.
pub trait Command: std::fmt::Debug + Send {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()>;
    fn undo(&mut self, timeline: &mut Timeline) -> Result<()>;
    fn description(&self) -> &str;
}

/// Undo/redo history stack.
#[derive(Debug)]
pub struct History {
    undo_stack: Vec<Box<dyn Command>>,
    redo_stack: Vec<Box<dyn Command>>,
    max_size: usize,
}

impl History {
    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size,
        }
    }

    /// Execute a command and push it onto the undo stack. Clears redo stack.
    pub fn execute(&mut self, mut cmd: Box<dyn Command>, timeline: &mut Timeline) -> Result<()> {
        cmd.execute(timeline)?;
        tracing::debug!(action = cmd.description(), "executed");
        self.redo_stack.clear();
        self.undo_stack.push(cmd);
        if self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
        Ok(())
    }

    /// Undo the last command.
    pub fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let mut cmd = self.undo_stack.pop().ok_or(CoreError::NothingToUndo)?;
        cmd.undo(timeline)?;
        self.redo_stack.push(cmd);
        Ok(())
    }

    /// Redo the last undone command.
    pub fn redo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let mut cmd = self.redo_stack.pop().ok_or(CoreError::NothingToRedo)?;
        cmd.execute(timeline)?;
        self.undo_stack.push(cmd);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|cmd| cmd.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|cmd| cmd.description())
    }
}

fn not_executed(what: &str) -> CoreError {
    CoreError::InvalidOperation(format!("{what} was never executed"))
}

// ---------------------------------------------------------------------------
// AddClipCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AddClipCommand {
    track_id: Uuid,
    clip: Clip,
}

impl AddClipCommand {
    pub fn new(track_id: Uuid, clip: Clip) -> Self {
        Self { track_id, clip }
    }
}

impl Command for AddClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.add_clip(self.track_id, self.clip.clone())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.remove_clip(self.clip.id).map(|_| ())
    }

    fn description(&self) -> &str {
        "Add clip"
    }
}

// ---------------------------------------------------------------------------
// RemoveClipCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RemovedClip {
    track_id: Uuid,
    clip: Clip,
    group: Option<(Uuid, Vec<Uuid>)>,
}

#[derive(Debug)]
pub struct RemoveClipCommand {
    clip_id: Uuid,
    removed: Option<RemovedClip>,
}

impl RemoveClipCommand {
    pub fn new(clip_id: Uuid) -> Self {
        Self {
            clip_id,
            removed: None,
        }
    }
}

impl Command for RemoveClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        let track_id = timeline.track_of(self.clip_id)?;
        let group = match timeline.clip(self.clip_id)?.group {
            Some(id) => Some((id, timeline.group(id)?.members.clone())),
            None => None,
        };
        let clip = timeline.remove_clip(self.clip_id)?;
        self.removed = Some(RemovedClip {
            track_id,
            clip,
            group,
        });
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let removed = self
            .removed
            .take()
            .ok_or_else(|| not_executed("remove"))?;
        timeline.add_clip(removed.track_id, removed.clip)?;
        if let Some((group_id, members)) = removed.group {
            timeline.restore_group(group_id, &members)?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Remove clip"
    }
}

// ---------------------------------------------------------------------------
// MoveClipCommand
// ---------------------------------------------------------------------------

/// Move a clip (and its group) to a new start, resolving collisions on the
/// way, or transfer it to another track.
#[derive(Debug)]
pub struct MoveClipCommand {
    clip_id: Uuid,
    seconds: f64,
    target_track: Option<Uuid>,
    before: Option<(Uuid, Vec<ClipExtent>)>,
}

impl MoveClipCommand {
    pub fn new(clip_id: Uuid, seconds: f64) -> Self {
        Self {
            clip_id,
            seconds,
            target_track: None,
            before: None,
        }
    }

    pub fn to_track(clip_id: Uuid, track_id: Uuid, seconds: f64) -> Self {
        Self {
            target_track: Some(track_id),
            ..Self::new(clip_id, seconds)
        }
    }
}

impl Command for MoveClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        let origin = timeline.track_of(self.clip_id)?;
        let extents = timeline.extents();
        match self.target_track {
            Some(track_id) if track_id != origin => {
                timeline.move_clip_to_track(self.clip_id, track_id, self.seconds)?
            }
            _ => timeline.move_clip(self.clip_id, self.seconds)?,
        }
        self.before = Some((origin, extents));
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let (origin, extents) = self.before.take().ok_or_else(|| not_executed("move"))?;
        timeline.transfer_clip(self.clip_id, origin)?;
        timeline.restore_extents(&extents);
        Ok(())
    }

    fn description(&self) -> &str {
        if self.target_track.is_some() {
            "Move clip to track"
        } else {
            "Move clip"
        }
    }
}

// ---------------------------------------------------------------------------
// TrimCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TrimCommand {
    clip_id: Uuid,
    edge: TrimEdge,
    seconds: f64,
    before: Option<Vec<ClipExtent>>,
}

impl TrimCommand {
    pub fn new(clip_id: Uuid, edge: TrimEdge, seconds: f64) -> Self {
        Self {
            clip_id,
            edge,
            seconds,
            before: None,
        }
    }
}

impl Command for TrimCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        let extents = timeline.extents();
        timeline.trim_clip(self.clip_id, self.edge, self.seconds)?;
        self.before = Some(extents);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let extents = self.before.take().ok_or_else(|| not_executed("trim"))?;
        timeline.restore_extents(&extents);
        Ok(())
    }

    fn description(&self) -> &str {
        match self.edge {
            TrimEdge::In => "Trim in-point",
            TrimEdge::Out => "Trim out-point",
        }
    }
}

// ---------------------------------------------------------------------------
// SplitCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SplitCommand {
    clip_id: Uuid,
    seconds: f64,
    right_id: Option<Uuid>,
    before: Option<ClipExtent>,
}

impl SplitCommand {
    pub fn new(clip_id: Uuid, seconds: f64) -> Self {
        Self {
            clip_id,
            seconds,
            right_id: None,
            before: None,
        }
    }

    /// Id of the right half produced by the last execution.
    pub fn right_id(&self) -> Option<Uuid> {
        self.right_id
    }
}

impl Command for SplitCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        let clip = timeline.clip(self.clip_id)?;
        let before = ClipExtent {
            id: clip.id,
            start: clip.start,
            in_point: clip.in_point,
            out_point: clip.out_point,
        };
        let (_, right_id) = timeline.split_at(self.clip_id, self.seconds)?;
        self.before = Some(before);
        self.right_id = Some(right_id);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let right_id = self.right_id.ok_or_else(|| not_executed("split"))?;
        let before = self.before.take().ok_or_else(|| not_executed("split"))?;
        timeline.remove_clip(right_id)?;
        timeline.restore_extents(&[before]);
        Ok(())
    }

    fn description(&self) -> &str {
        "Split clip"
    }
}

// ---------------------------------------------------------------------------
// InsertClipCommand
// ---------------------------------------------------------------------------

/// Commit a drag-insertion preview: the downstream displacement and the new
/// clip land as one undoable step.
#[derive(Debug)]
pub struct InsertClipCommand {
    preview: InsertionPreview,
    clip: Clip,
    before: Option<Vec<ClipExtent>>,
}

impl InsertClipCommand {
    pub fn new(preview: InsertionPreview, clip: Clip) -> Self {
        Self {
            preview,
            clip,
            before: None,
        }
    }
}

impl Command for InsertClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        let extents = timeline.extents();
        timeline.commit_insertion(&self.preview, self.clip.clone())?;
        self.before = Some(extents);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let extents = self.before.take().ok_or_else(|| not_executed("insert"))?;
        timeline.remove_clip(self.clip.id)?;
        timeline.restore_extents(&extents);
        Ok(())
    }

    fn description(&self) -> &str {
        "Insert clip"
    }
}

// ---------------------------------------------------------------------------
// LinkClipsCommand / UnlinkClipCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LinkClipsCommand {
    clip_ids: Vec<Uuid>,
    group_id: Option<Uuid>,
}

impl LinkClipsCommand {
    pub fn new(clip_ids: Vec<Uuid>) -> Self {
        Self {
            clip_ids,
            group_id: None,
        }
    }

    pub fn group_id(&self) -> Option<Uuid> {
        self.group_id
    }
}

impl Command for LinkClipsCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        self.group_id = Some(timeline.link_clips(&self.clip_ids)?);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let group_id = self.group_id.take().ok_or_else(|| not_executed("link"))?;
        timeline.dissolve_group(group_id).map(|_| ())
    }

    fn description(&self) -> &str {
        "Link clips"
    }
}

#[derive(Debug)]
pub struct UnlinkClipCommand {
    clip_id: Uuid,
    previous: Option<(Uuid, Vec<Uuid>)>,
}

impl UnlinkClipCommand {
    pub fn new(clip_id: Uuid) -> Self {
        Self {
            clip_id,
            previous: None,
        }
    }
}

impl Command for UnlinkClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        self.previous = match timeline.clip(self.clip_id)?.group {
            Some(id) => Some((id, timeline.group(id)?.members.clone())),
            None => None,
        };
        timeline.unlink_clip(self.clip_id)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        if let Some((group_id, members)) = self.previous.take() {
            timeline.restore_group(group_id, &members)?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Unlink clip"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
