use crate::graph::{LayerMask, MixerId, Port};
use crate::state::{BlendSpaceState, ClipState, MultiClipState, StateKind};
use crate::tree::FadeChannel;

/// Index into the tree arena. Stable for the lifetime of the tree.
pub type NodeId = usize;

#[derive(Debug)]
pub struct LayerSettings {
    pub additive: bool,
    pub mask: Option<LayerMask>,
    pub initial_weight: f32,
}

#[derive(Debug)]
pub enum NodeKind {
    Layer(LayerSettings),
    State(StateKind),
}

#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub fade: FadeChannel,
    pub kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Input slot in the owner's mixer, assigned at spawn.
    pub(crate) port: Option<Port>,
    /// Mixer owned by this node (layers and groups), created at spawn.
    pub(crate) mixer: Option<MixerId>,
    /// Last weight pushed to the owner's mixer, for de-duplicated writes.
    pub(crate) cached_weight: f32,
    /// Contribution computed by the running propagation pass.
    pub(crate) pending_weight: f32,
}

impl Node {
    pub(crate) fn new(name: &str, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            fade: FadeChannel::default(),
            kind,
            parent,
            children: Vec::new(),
            port: None,
            mixer: None,
            cached_weight: 0.0,
            pending_weight: 0.0,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn port(&self) -> Option<Port> {
        self.port
    }

    pub fn is_layer(&self) -> bool {
        matches!(self.kind, NodeKind::Layer(_))
    }

    pub fn state_kind(&self) -> Option<&StateKind> {
        match &self.kind {
            NodeKind::State(kind) => Some(kind),
            NodeKind::Layer(_) => None,
        }
    }

    pub fn clip(&self) -> Option<&ClipState> {
        match &self.kind {
            NodeKind::State(StateKind::Clip(clip)) => Some(clip),
            _ => None,
        }
    }

    pub fn clip_mut(&mut self) -> Option<&mut ClipState> {
        match &mut self.kind {
            NodeKind::State(StateKind::Clip(clip)) => Some(clip),
            _ => None,
        }
    }

    pub fn multi_clip(&self) -> Option<&MultiClipState> {
        match &self.kind {
            NodeKind::State(StateKind::MultiClip(multi)) => Some(multi),
            _ => None,
        }
    }

    pub fn multi_clip_mut(&mut self) -> Option<&mut MultiClipState> {
        match &mut self.kind {
            NodeKind::State(StateKind::MultiClip(multi)) => Some(multi),
            _ => None,
        }
    }

    pub fn blend_space(&self) -> Option<&BlendSpaceState> {
        match &self.kind {
            NodeKind::State(StateKind::BlendSpace(blend)) => Some(blend),
            _ => None,
        }
    }

    pub fn blend_space_mut(&mut self) -> Option<&mut BlendSpaceState> {
        match &mut self.kind {
            NodeKind::State(StateKind::BlendSpace(blend)) => Some(blend),
            _ => None,
        }
    }
}
