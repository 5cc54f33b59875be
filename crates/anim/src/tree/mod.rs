mod arena;
mod desc;
mod fade;
mod node;

pub use arena::AnimationTree;
pub use desc::{ControllerDesc, LayerDesc, StateDesc, StateKindDesc};
pub use fade::FadeChannel;
pub use node::{LayerSettings, Node, NodeId, NodeKind};
