mod debug;

pub use debug::DebugGraph;

use serde::{Deserialize, Serialize};

pub type MixerId = u32;
pub type SourceId = u32;
pub type Port = u32;

/// Anything that can be plugged into a mixer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphInput {
    Source(SourceId),
    Mixer(MixerId),
}

/// Static per-layer mask restricting which rig regions a layer drives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerMask {
    pub regions: Vec<String>,
}

impl LayerMask {
    pub fn new(regions: &[&str]) -> Self {
        Self {
            regions: regions.iter().map(|r| (*r).to_string()).collect(),
        }
    }
}

/// Execution backend that turns weighted inputs into a pose.
///
/// The blending engine only ever pushes weights and clip times through this
/// interface; it never inspects backend internals. `connect` returning `None`
/// means the mixer could not provide an input slot, which callers treat as a
/// fatal setup failure.
pub trait PoseGraph {
    fn create_mixer(&mut self) -> MixerId;
    fn destroy_mixer(&mut self, mixer: MixerId);

    fn create_source(&mut self, name: &str) -> SourceId;
    fn destroy_source(&mut self, source: SourceId);
    fn set_source_time(&mut self, source: SourceId, time: f32);

    fn connect(&mut self, mixer: MixerId, input: GraphInput, weight: f32) -> Option<Port>;
    fn set_input_weight(&mut self, mixer: MixerId, port: Port, weight: f32);
    fn input_weight(&self, mixer: MixerId, port: Port) -> f32;

    fn set_additive(&mut self, mixer: MixerId, port: Port, additive: bool);
    fn set_mask(&mut self, mixer: MixerId, port: Port, mask: &LayerMask);

    fn evaluate(&mut self);
}
