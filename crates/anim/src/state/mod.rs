mod blend_space;
mod clip;

pub use blend_space::{BlendClipDesc, BlendSpaceDesc, BlendSpaceState};
pub use clip::{ClipDesc, ClipState, MultiClipState};

use crate::controller::ControllerError;
use crate::graph::{GraphInput, PoseGraph};

/// Closed set of state behaviors. The set is fixed at build time, so lookup
/// and per-kind replication dispatch on the tag instead of runtime type
/// inspection.
#[derive(Debug)]
pub enum StateKind {
    /// Pure container: blends its child states through an owned mixer.
    Group,
    /// Plays a single clip and replicates its normalized play time.
    Clip(ClipState),
    /// Owns a set of clip variants with exactly one audible at a time.
    MultiClip(MultiClipState),
    /// 2D blend space; replicates play time and the per-clip weight array.
    BlendSpace(BlendSpaceState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKindTag {
    Group,
    Clip,
    MultiClip,
    BlendSpace,
}

impl StateKind {
    pub fn tag(&self) -> StateKindTag {
        match self {
            StateKind::Group => StateKindTag::Group,
            StateKind::Clip(_) => StateKindTag::Clip,
            StateKind::MultiClip(_) => StateKindTag::MultiClip,
            StateKind::BlendSpace(_) => StateKindTag::BlendSpace,
        }
    }

    /// Creates the backend resources for this state and returns what to plug
    /// into the owner's mixer. Kinds that own a mixer report it here so the
    /// node can also route child states into it.
    pub(crate) fn spawn<G: PoseGraph>(
        &mut self,
        graph: &mut G,
    ) -> Result<GraphInput, ControllerError> {
        match self {
            StateKind::Group => Ok(GraphInput::Mixer(graph.create_mixer())),
            StateKind::Clip(clip) => Ok(GraphInput::Source(clip.spawn(graph))),
            StateKind::MultiClip(multi) => Ok(GraphInput::Mixer(multi.spawn(graph)?)),
            StateKind::BlendSpace(blend) => Ok(GraphInput::Mixer(blend.spawn(graph)?)),
        }
    }

    pub(crate) fn despawn<G: PoseGraph>(&mut self, graph: &mut G) {
        match self {
            StateKind::Group => {}
            StateKind::Clip(clip) => clip.despawn(graph),
            StateKind::MultiClip(multi) => multi.despawn(graph),
            StateKind::BlendSpace(blend) => blend.despawn(graph),
        }
    }

    pub(crate) fn fixed_update<G: PoseGraph>(&mut self, dt: f32, graph: &mut G) {
        match self {
            StateKind::Group => {}
            StateKind::Clip(clip) => clip.fixed_update(dt, graph),
            StateKind::MultiClip(multi) => multi.fixed_update(dt, graph),
            StateKind::BlendSpace(blend) => blend.fixed_update(dt, graph),
        }
    }

    pub(crate) fn interpolate<G: PoseGraph>(&mut self, graph: &mut G) {
        match self {
            StateKind::Group => {}
            StateKind::Clip(clip) => clip.interpolate(graph),
            StateKind::MultiClip(multi) => multi.interpolate(graph),
            StateKind::BlendSpace(blend) => blend.interpolate(graph),
        }
    }

    pub(crate) fn set_defaults(&mut self) {
        match self {
            StateKind::Group => {}
            StateKind::Clip(clip) => clip.set_defaults(),
            StateKind::MultiClip(multi) => multi.set_defaults(),
            StateKind::BlendSpace(blend) => blend.set_defaults(),
        }
    }

    /// Words this state adds to the wire image beyond the shared weight pair.
    pub(crate) fn extra_word_count(&self) -> usize {
        match self {
            StateKind::Group => 0,
            StateKind::Clip(_) => 1,
            StateKind::MultiClip(_) => 2,
            StateKind::BlendSpace(blend) => 1 + blend.weights.len(),
        }
    }
}
