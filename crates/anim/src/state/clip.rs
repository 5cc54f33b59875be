use serde::{Deserialize, Serialize};

use crate::controller::ControllerError;
use crate::graph::{GraphInput, MixerId, PoseGraph, Port, SourceId};

fn default_speed() -> f32 {
    1.0
}

/// Static description of a single clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipDesc {
    pub clip: String,
    pub length: f32,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub looping: bool,
}

impl ClipDesc {
    pub fn new(clip: &str, length: f32, looping: bool) -> Self {
        Self {
            clip: clip.to_string(),
            length,
            speed: 1.0,
            looping,
        }
    }
}

/// Leaf state playing one clip. `time` is normalized [0,1] and advanced by the
/// fixed path only; `interpolated_time` belongs to the render path.
#[derive(Debug)]
pub struct ClipState {
    pub desc: ClipDesc,
    pub time: f32,
    pub interpolated_time: f32,
    source: Option<SourceId>,
}

impl ClipState {
    pub fn new(desc: ClipDesc) -> Self {
        Self {
            desc,
            time: 0.0,
            interpolated_time: 0.0,
            source: None,
        }
    }

    /// The clip reached `normalized_time`. Combine with the node's activity
    /// predicate for a "finished while still active" query.
    pub fn is_finished(&self, normalized_time: f32) -> bool {
        self.time >= normalized_time
    }

    pub(crate) fn spawn<G: PoseGraph>(&mut self, graph: &mut G) -> SourceId {
        let source = graph.create_source(&self.desc.clip);
        self.source = Some(source);
        source
    }

    pub(crate) fn despawn<G: PoseGraph>(&mut self, graph: &mut G) {
        if let Some(source) = self.source.take() {
            graph.destroy_source(source);
        }
    }

    pub(crate) fn fixed_update<G: PoseGraph>(&mut self, dt: f32, graph: &mut G) {
        self.time = advance_clip_time(self.time, dt, &self.desc);

        if let Some(source) = self.source {
            graph.set_source_time(source, self.time * self.desc.length);
        }
    }

    pub(crate) fn interpolate<G: PoseGraph>(&mut self, graph: &mut G) {
        if let Some(source) = self.source {
            graph.set_source_time(source, self.interpolated_time * self.desc.length);
        }
    }

    pub(crate) fn set_defaults(&mut self) {
        self.time = 0.0;
    }
}

/// A bank of clip variants behind one mixer; exactly one variant plays at a
/// time. The active index is chosen by the authority and replicated verbatim.
#[derive(Debug)]
pub struct MultiClipState {
    pub clips: Vec<ClipDesc>,
    pub time: f32,
    pub interpolated_time: f32,
    pub active_clip: usize,
    /// Render-side copy of the active index, stepped between snapshots.
    pub interpolated_clip: usize,
    mixer: Option<MixerId>,
    sources: Vec<SourceId>,
    ports: Vec<Port>,
}

impl MultiClipState {
    pub fn new(clips: Vec<ClipDesc>) -> Self {
        Self {
            clips,
            time: 0.0,
            interpolated_time: 0.0,
            active_clip: 0,
            interpolated_clip: 0,
            mixer: None,
            sources: Vec::new(),
            ports: Vec::new(),
        }
    }

    pub fn set_active_clip(&mut self, index: usize) {
        if index < self.clips.len() {
            self.active_clip = index;
        }
    }

    pub fn is_finished(&self, normalized_time: f32) -> bool {
        self.time >= normalized_time
    }

    pub(crate) fn spawn<G: PoseGraph>(
        &mut self,
        graph: &mut G,
    ) -> Result<MixerId, ControllerError> {
        let mixer = graph.create_mixer();

        self.sources.clear();
        self.ports.clear();

        for clip in &self.clips {
            let source = graph.create_source(&clip.clip);
            let port = graph
                .connect(mixer, GraphInput::Source(source), 0.0)
                .ok_or(ControllerError::PortUnavailable)?;

            self.sources.push(source);
            self.ports.push(port);
        }

        self.mixer = Some(mixer);
        Ok(mixer)
    }

    pub(crate) fn despawn<G: PoseGraph>(&mut self, graph: &mut G) {
        for source in self.sources.drain(..) {
            graph.destroy_source(source);
        }
        self.ports.clear();

        if let Some(mixer) = self.mixer.take() {
            graph.destroy_mixer(mixer);
        }
    }

    pub(crate) fn fixed_update<G: PoseGraph>(&mut self, dt: f32, graph: &mut G) {
        let Some(clip) = self.clips.get(self.active_clip) else {
            return;
        };

        self.time = advance_clip_time(self.time, dt, clip);
        self.apply(self.active_clip, self.time, graph);
    }

    pub(crate) fn interpolate<G: PoseGraph>(&mut self, graph: &mut G) {
        if self.interpolated_clip < self.clips.len() {
            self.apply(self.interpolated_clip, self.interpolated_time, graph);
        }
    }

    fn apply<G: PoseGraph>(&self, active: usize, time: f32, graph: &mut G) {
        let Some(mixer) = self.mixer else {
            return;
        };

        for (index, port) in self.ports.iter().enumerate() {
            let weight = if index == active { 1.0 } else { 0.0 };
            graph.set_input_weight(mixer, *port, weight);
        }

        if let Some(source) = self.sources.get(active) {
            graph.set_source_time(*source, time * self.clips[active].length);
        }
    }

    pub(crate) fn set_defaults(&mut self) {
        self.time = 0.0;
    }
}

fn advance_clip_time(time: f32, dt: f32, desc: &ClipDesc) -> f32 {
    if desc.length <= 0.0 {
        return 0.0;
    }

    let mut new_time = time + dt * desc.speed / desc.length;
    if new_time >= 1.0 {
        if desc.looping {
            new_time %= 1.0;
        } else {
            new_time = 1.0;
        }
    }

    new_time
}
