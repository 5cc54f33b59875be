pub mod controller;
pub mod graph;
pub mod net;
pub mod state;
pub mod tree;

pub use controller::{
    Authority, Controller, ControllerError, FixedContext, RenderContext, Stage,
};
pub use graph::{DebugGraph, GraphInput, LayerMask, MixerId, PoseGraph, Port, SourceId};
pub use net::{
    CodecTable, ControllerFlags, ReplicatedStatus, Snapshot, SnapshotBuffer, SnapshotError,
    interpolate_time, interpolate_weight,
};
pub use state::{BlendClipDesc, BlendSpaceDesc, ClipDesc, StateKind, StateKindTag};
pub use tree::{
    AnimationTree, ControllerDesc, FadeChannel, LayerDesc, Node, NodeId, NodeKind, StateDesc,
    StateKindDesc,
};
