use serde::{Deserialize, Serialize};

use crate::graph::LayerMask;
use crate::state::{BlendSpaceDesc, ClipDesc};

fn default_weight() -> f32 {
    1.0
}

/// Static description of the whole blend tree. The runtime tree shape is
/// built from this exactly once and never mutated, which is also what makes
/// the wire layout identical on every peer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerDesc {
    pub layers: Vec<LayerDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDesc {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub additive: bool,
    #[serde(default)]
    pub mask: Option<LayerMask>,
    #[serde(default)]
    pub states: Vec<StateDesc>,
}

impl LayerDesc {
    pub fn new(name: &str, states: Vec<StateDesc>) -> Self {
        Self {
            name: name.to_string(),
            weight: 1.0,
            additive: false,
            mask: None,
            states,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDesc {
    pub name: String,
    pub kind: StateKindDesc,
    #[serde(default)]
    pub states: Vec<StateDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateKindDesc {
    Group,
    Clip(ClipDesc),
    MultiClip(Vec<ClipDesc>),
    BlendSpace(BlendSpaceDesc),
}

impl StateDesc {
    pub fn group(name: &str, states: Vec<StateDesc>) -> Self {
        Self {
            name: name.to_string(),
            kind: StateKindDesc::Group,
            states,
        }
    }

    pub fn clip(name: &str, clip: ClipDesc) -> Self {
        Self {
            name: name.to_string(),
            kind: StateKindDesc::Clip(clip),
            states: Vec::new(),
        }
    }

    pub fn multi_clip(name: &str, clips: Vec<ClipDesc>) -> Self {
        Self {
            name: name.to_string(),
            kind: StateKindDesc::MultiClip(clips),
            states: Vec::new(),
        }
    }

    pub fn blend_space(name: &str, blend_space: BlendSpaceDesc) -> Self {
        Self {
            name: name.to_string(),
            kind: StateKindDesc::BlendSpace(blend_space),
            states: Vec::new(),
        }
    }
}
