use super::{GraphInput, LayerMask, MixerId, PoseGraph, Port, SourceId};

#[derive(Debug)]
struct DebugInput {
    input: GraphInputSlot,
    weight: f32,
    additive: bool,
    mask: Option<LayerMask>,
}

#[derive(Debug)]
enum GraphInputSlot {
    Source(SourceId),
    Mixer(MixerId),
}

#[derive(Debug, Default)]
struct DebugMixer {
    inputs: Vec<DebugInput>,
    destroyed: bool,
}

#[derive(Debug)]
struct DebugSource {
    name: String,
    time: f32,
    destroyed: bool,
}

/// In-memory pose graph used by tests and headless tooling. Records every
/// weight and clip time pushed into it; `evaluate` only counts invocations.
#[derive(Debug, Default)]
pub struct DebugGraph {
    mixers: Vec<DebugMixer>,
    sources: Vec<DebugSource>,
    evaluations: u64,
}

impl DebugGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn source_name(&self, source: SourceId) -> &str {
        &self.sources[source as usize].name
    }

    pub fn source_time(&self, source: SourceId) -> f32 {
        self.sources[source as usize].time
    }

    pub fn input_count(&self, mixer: MixerId) -> usize {
        self.mixers[mixer as usize].inputs.len()
    }

    /// The source plugged into a mixer input, if that input is a leaf.
    pub fn input_source(&self, mixer: MixerId, port: Port) -> Option<SourceId> {
        match self.mixers[mixer as usize].inputs[port as usize].input {
            GraphInputSlot::Source(source) => Some(source),
            _ => None,
        }
    }

    pub fn is_mixer_destroyed(&self, mixer: MixerId) -> bool {
        self.mixers[mixer as usize].destroyed
    }

    pub fn is_source_destroyed(&self, source: SourceId) -> bool {
        self.sources[source as usize].destroyed
    }

    pub fn is_additive(&self, mixer: MixerId, port: Port) -> bool {
        self.mixers[mixer as usize].inputs[port as usize].additive
    }

    pub fn mask(&self, mixer: MixerId, port: Port) -> Option<&LayerMask> {
        self.mixers[mixer as usize].inputs[port as usize].mask.as_ref()
    }
}

impl PoseGraph for DebugGraph {
    fn create_mixer(&mut self) -> MixerId {
        self.mixers.push(DebugMixer::default());
        (self.mixers.len() - 1) as MixerId
    }

    fn destroy_mixer(&mut self, mixer: MixerId) {
        self.mixers[mixer as usize].destroyed = true;
    }

    fn create_source(&mut self, name: &str) -> SourceId {
        self.sources.push(DebugSource {
            name: name.to_string(),
            time: 0.0,
            destroyed: false,
        });
        (self.sources.len() - 1) as SourceId
    }

    fn destroy_source(&mut self, source: SourceId) {
        self.sources[source as usize].destroyed = true;
    }

    fn set_source_time(&mut self, source: SourceId, time: f32) {
        self.sources[source as usize].time = time;
    }

    fn connect(&mut self, mixer: MixerId, input: GraphInput, weight: f32) -> Option<Port> {
        let slot = match input {
            GraphInput::Source(source) => GraphInputSlot::Source(source),
            GraphInput::Mixer(sub) => GraphInputSlot::Mixer(sub),
        };

        let inputs = &mut self.mixers[mixer as usize].inputs;
        inputs.push(DebugInput {
            input: slot,
            weight,
            additive: false,
            mask: None,
        });

        Some((inputs.len() - 1) as Port)
    }

    fn set_input_weight(&mut self, mixer: MixerId, port: Port, weight: f32) {
        self.mixers[mixer as usize].inputs[port as usize].weight = weight;
    }

    fn input_weight(&self, mixer: MixerId, port: Port) -> f32 {
        self.mixers[mixer as usize].inputs[port as usize].weight
    }

    fn set_additive(&mut self, mixer: MixerId, port: Port, additive: bool) {
        self.mixers[mixer as usize].inputs[port as usize].additive = additive;
    }

    fn set_mask(&mut self, mixer: MixerId, port: Port, mask: &LayerMask) {
        self.mixers[mixer as usize].inputs[port as usize].mask = Some(mask.clone());
    }

    fn evaluate(&mut self) {
        self.evaluations += 1;
        log::trace!("graph evaluate #{}", self.evaluations);
    }
}
