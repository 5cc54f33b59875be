use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::controller::ControllerError;
use crate::graph::{GraphInput, MixerId, PoseGraph, Port, SourceId};

fn default_speed() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendClipDesc {
    pub clip: String,
    pub length: f32,
    #[serde(default = "default_speed")]
    pub speed: f32,
    pub position: Vec2,
}

impl BlendClipDesc {
    pub fn new(clip: &str, length: f32, position: Vec2) -> Self {
        Self {
            clip: clip.to_string(),
            length,
            speed: 1.0,
            position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendSpaceDesc {
    pub clips: Vec<BlendClipDesc>,
    #[serde(default)]
    pub looping: bool,
}

/// 2D blend space driven by a gameplay-supplied position. The fixed path
/// computes gradient-band weights from `position`; the weights and the
/// normalized play time are replicated, so proxies never re-derive them from
/// gameplay state.
#[derive(Debug)]
pub struct BlendSpaceState {
    pub desc: BlendSpaceDesc,
    pub position: Vec2,
    pub time: f32,
    pub interpolated_time: f32,
    pub weights: Vec<f32>,
    pub interpolated_weights: Vec<f32>,
    bands: BlendBands,
    mixer: Option<MixerId>,
    sources: Vec<SourceId>,
    ports: Vec<Port>,
}

impl BlendSpaceState {
    pub fn new(desc: BlendSpaceDesc) -> Self {
        let count = desc.clips.len();
        let positions: Vec<Vec2> = desc.clips.iter().map(|c| c.position).collect();

        Self {
            desc,
            position: Vec2::ZERO,
            time: 0.0,
            interpolated_time: 0.0,
            weights: vec![0.0; count],
            interpolated_weights: vec![0.0; count],
            bands: BlendBands::new(&positions),
            mixer: None,
            sources: Vec::new(),
            ports: Vec::new(),
        }
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
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

        for clip in &self.desc.clips {
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
        self.bands.calculate(self.position, &mut self.weights);

        let length = self.blended_length(&self.weights);
        if length > 0.0 {
            let mut new_time = self.time + dt / length;
            if new_time >= 1.0 {
                if self.desc.looping {
                    new_time %= 1.0;
                } else {
                    new_time = 1.0;
                }
            }
            self.time = new_time;
        }

        self.apply(true, graph);
    }

    pub(crate) fn interpolate<G: PoseGraph>(&mut self, graph: &mut G) {
        self.apply(false, graph);
    }

    fn apply<G: PoseGraph>(&mut self, fixed: bool, graph: &mut G) {
        let Some(mixer) = self.mixer else {
            return;
        };

        let (weights, time) = if fixed {
            (&self.weights, self.time)
        } else {
            (&self.interpolated_weights, self.interpolated_time)
        };

        for (index, port) in self.ports.iter().enumerate() {
            graph.set_input_weight(mixer, *port, weights[index]);
        }

        for (index, source) in self.sources.iter().enumerate() {
            graph.set_source_time(*source, time * self.desc.clips[index].length);
        }
    }

    /// Playback length at the current weighting, with per-clip speed applied.
    fn blended_length(&self, weights: &[f32]) -> f32 {
        let mut length = 0.0;
        for (index, clip) in self.desc.clips.iter().enumerate() {
            if clip.speed > 0.0 {
                length += weights[index] * clip.length / clip.speed;
            }
        }

        if length > 0.0 {
            length
        } else if let Some(first) = self.desc.clips.first() {
            first.length
        } else {
            0.0
        }
    }

    pub(crate) fn set_defaults(&mut self) {
        self.time = 0.0;
    }
}

/// Precomputed pairwise terms for gradient-band interpolation in polar space.
#[derive(Debug)]
struct BlendBands {
    positions: Vec<Vec2>,
    magnitudes: Vec<f32>,
    polar_distances: Vec<Vec<Vec2>>,
    inverse_average_magnitudes: Vec<Vec<f32>>,
}

impl BlendBands {
    fn new(positions: &[Vec2]) -> Self {
        let count = positions.len();
        let magnitudes: Vec<f32> = positions.iter().map(|p| p.length()).collect();

        let mut polar_distances = vec![vec![Vec2::ZERO; count]; count];
        let mut inverse_average_magnitudes = vec![vec![0.0f32; count]; count];

        for i in 0..count {
            for j in 0..count {
                if i == j {
                    continue;
                }

                let average_magnitude = (magnitudes[i] + magnitudes[j]) * 0.5;
                let inverse_average = if average_magnitude > 0.0 {
                    1.0 / average_magnitude
                } else {
                    0.0
                };

                let angle = signed_angle(positions[i], positions[j]);
                let polar_distance = magnitudes[j] - magnitudes[i];

                let mut a_to_b = Vec2::new(polar_distance * inverse_average, angle);
                let square_magnitude = a_to_b.length_squared();
                if square_magnitude > 0.0 {
                    a_to_b /= square_magnitude;
                }

                polar_distances[i][j] = a_to_b;
                inverse_average_magnitudes[i][j] = inverse_average;
            }
        }

        Self {
            positions: positions.to_vec(),
            magnitudes,
            polar_distances,
            inverse_average_magnitudes,
        }
    }

    fn calculate(&self, position: Vec2, weights: &mut [f32]) {
        let count = self.positions.len();
        let position_magnitude = position.length();
        let mut accumulated = 0.0;

        for i in 0..count {
            let mut weight = 1.0f32;
            let position_angle = signed_angle(self.positions[i], position);
            let position_polar_distance = position_magnitude - self.magnitudes[i];

            for j in 0..count {
                if i == j {
                    continue;
                }

                let a_to_b = self.polar_distances[i][j];
                let a_to_p = Vec2::new(
                    position_polar_distance * self.inverse_average_magnitudes[i][j],
                    position_angle,
                );

                let desired = 1.0 - a_to_b.x * a_to_p.x - a_to_b.y * a_to_p.y;
                if desired < weight {
                    weight = desired;
                }
            }

            weights[i] = weight.max(0.0);
            accumulated += weights[i];
        }

        if accumulated > 0.0 {
            let inverse = 1.0 / accumulated;
            for weight in weights.iter_mut() {
                *weight *= inverse;
            }
        }
    }
}

fn signed_angle(a: Vec2, b: Vec2) -> f32 {
    if (a.x == 0.0 && a.y == 0.0) || (b.x == 0.0 && b.y == 0.0) {
        return 0.0;
    }

    let x = a.x * b.x + a.y * b.y;
    let y = a.x * b.y - a.y * b.x;

    y.atan2(x)
}
