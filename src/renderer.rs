use std::io::Write;

use anyhow::{Context, Result};
use log::{info, trace, warn};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;

use crate::appearance::Appearance;
use crate::types::{ObjectId, ObjectType, Pose};

/// The drawing surface. It keeps no entity state of its own and only mirrors
/// what the reconciler tells it.
#[cfg_attr(test, automock)]
pub trait Renderer {
    fn create(
        &mut self,
        id: &ObjectId,
        object_type: ObjectType,
        appearance: &Appearance,
        pose: Pose,
    );

    fn update_pose(&mut self, id: &ObjectId, pose: Pose);

    fn remove(&mut self, id: &ObjectId);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Create {
        id: ObjectId,
        object_type: ObjectType,
        appearance: Appearance,
        pose: Pose,
    },
    UpdatePose {
        id: ObjectId,
        pose: Pose,
    },
    Remove {
        id: ObjectId,
    },
}

/// Captures effects in order.
impl Renderer for Vec<Effect> {
    fn create(
        &mut self,
        id: &ObjectId,
        object_type: ObjectType,
        appearance: &Appearance,
        pose: Pose,
    ) {
        self.push(Effect::Create {
            id: id.clone(),
            object_type,
            appearance: appearance.clone(),
            pose,
        });
    }

    fn update_pose(&mut self, id: &ObjectId, pose: Pose) {
        self.push(Effect::UpdatePose {
            id: id.clone(),
            pose,
        });
    }

    fn remove(&mut self, id: &ObjectId) {
        self.push(Effect::Remove { id: id.clone() });
    }
}

impl<R: Renderer> Renderer for Option<R> {
    fn create(
        &mut self,
        id: &ObjectId,
        object_type: ObjectType,
        appearance: &Appearance,
        pose: Pose,
    ) {
        if let Some(renderer) = self {
            renderer.create(id, object_type, appearance, pose);
        }
    }

    fn update_pose(&mut self, id: &ObjectId, pose: Pose) {
        if let Some(renderer) = self {
            renderer.update_pose(id, pose);
        }
    }

    fn remove(&mut self, id: &ObjectId) {
        if let Some(renderer) = self {
            renderer.remove(id);
        }
    }
}

impl<A: Renderer, B: Renderer> Renderer for (A, B) {
    fn create(
        &mut self,
        id: &ObjectId,
        object_type: ObjectType,
        appearance: &Appearance,
        pose: Pose,
    ) {
        self.0.create(id, object_type, appearance, pose);
        self.1.create(id, object_type, appearance, pose);
    }

    fn update_pose(&mut self, id: &ObjectId, pose: Pose) {
        self.0.update_pose(id, pose);
        self.1.update_pose(id, pose);
    }

    fn remove(&mut self, id: &ObjectId) {
        self.0.remove(id);
        self.1.remove(id);
    }
}

/// Reports every effect through the `log` facade.
#[derive(Debug, Default)]
pub struct LogRenderer {
    on_screen: usize,
}

impl Renderer for LogRenderer {
    fn create(
        &mut self,
        id: &ObjectId,
        object_type: ObjectType,
        appearance: &Appearance,
        pose: Pose,
    ) {
        self.on_screen += 1;
        info!(
            "+ {id} {object_type} ({} {}x{}) at ({:.1}, {:.1}) rot {:.2}, {} on screen",
            appearance.asset,
            appearance.width,
            appearance.height,
            pose.position.x,
            pose.position.y,
            pose.rotation,
            self.on_screen
        );
    }

    fn update_pose(&mut self, id: &ObjectId, pose: Pose) {
        trace!(
            "~ {id} at ({:.1}, {:.1}) rot {:.2}",
            pose.position.x,
            pose.position.y,
            pose.rotation
        );
    }

    fn remove(&mut self, id: &ObjectId) {
        self.on_screen = self.on_screen.saturating_sub(1);
        info!("- {id}, {} on screen", self.on_screen);
    }
}

#[derive(Debug, Serialize)]
struct EffectRow<'a> {
    effect: &'static str,
    object_id: &'a str,
    object_type: Option<ObjectType>,
    asset: Option<&'static str>,
    x: Option<f64>,
    y: Option<f64>,
    rotation: Option<f64>,
}

impl<'a> EffectRow<'a> {
    fn new(effect: &'static str, id: &'a ObjectId) -> Self {
        Self {
            effect,
            object_id: id.as_str(),
            object_type: None,
            asset: None,
            x: None,
            y: None,
            rotation: None,
        }
    }

    fn with_pose(mut self, pose: Pose) -> Self {
        self.x = Some(pose.position.x);
        self.y = Some(pose.position.y);
        self.rotation = Some(pose.rotation);
        self
    }
}

/// Records the effect stream as CSV, one row per effect.
pub struct CsvRecorder<W: Write> {
    writer: csv::Writer<W>,
    failed: bool,
}

impl CsvRecorder<std::fs::File> {
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("cannot create recording {}", path.display()))?;
        Ok(Self {
            writer,
            failed: false,
        })
    }
}

impl<W: Write> CsvRecorder<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            failed: false,
        }
    }

    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("cannot flush recording: {}", err.error()))
    }

    fn write(&mut self, row: EffectRow<'_>) {
        if self.failed {
            return;
        }
        // One failed write stops the recording; the visualization goes on.
        if let Err(err) = self.writer.serialize(row) {
            warn!("recording stopped: {err}");
            self.failed = true;
        }
    }
}

impl<W: Write> Renderer for CsvRecorder<W> {
    fn create(
        &mut self,
        id: &ObjectId,
        object_type: ObjectType,
        appearance: &Appearance,
        pose: Pose,
    ) {
        let mut row = EffectRow::new("create", id).with_pose(pose);
        row.object_type = Some(object_type);
        row.asset = Some(appearance.asset);
        self.write(row);
    }

    fn update_pose(&mut self, id: &ObjectId, pose: Pose) {
        self.write(EffectRow::new("update_pose", id).with_pose(pose));
    }

    fn remove(&mut self, id: &ObjectId) {
        self.write(EffectRow::new("remove", id));
    }
}
