use log::debug;

use crate::controller::ControllerError;
use crate::graph::{GraphInput, MixerId, PoseGraph};
use crate::state::{BlendSpaceState, ClipState, MultiClipState, StateKind, StateKindTag};
use crate::tree::desc::{ControllerDesc, LayerDesc, StateDesc, StateKindDesc};
use crate::tree::node::{LayerSettings, Node, NodeId, NodeKind};

/// Arena-allocated blend tree. Layers are the roots; the shape is fixed at
/// build time and only per-session resources (mixers, ports) come and go with
/// spawn/despawn.
#[derive(Debug)]
pub struct AnimationTree {
    nodes: Vec<Node>,
    layers: Vec<NodeId>,
}

impl AnimationTree {
    pub fn build(desc: &ControllerDesc) -> Result<Self, ControllerError> {
        let mut tree = Self {
            nodes: Vec::new(),
            layers: Vec::new(),
        };

        for layer in &desc.layers {
            tree.build_layer(layer)?;
        }

        Ok(tree)
    }

    fn build_layer(&mut self, desc: &LayerDesc) -> Result<(), ControllerError> {
        let settings = LayerSettings {
            additive: desc.additive,
            mask: desc.mask.clone(),
            initial_weight: desc.weight,
        };

        let id = self.nodes.len();
        self.nodes
            .push(Node::new(&desc.name, NodeKind::Layer(settings), None));
        self.layers.push(id);

        for state in &desc.states {
            let child = self.build_state(state, id)?;
            self.nodes[id].children.push(child);
        }

        Ok(())
    }

    fn build_state(&mut self, desc: &StateDesc, parent: NodeId) -> Result<NodeId, ControllerError> {
        let kind = match &desc.kind {
            StateKindDesc::Group => StateKind::Group,
            StateKindDesc::Clip(clip) => StateKind::Clip(ClipState::new(clip.clone())),
            StateKindDesc::MultiClip(clips) => {
                StateKind::MultiClip(MultiClipState::new(clips.clone()))
            }
            StateKindDesc::BlendSpace(blend) => {
                StateKind::BlendSpace(BlendSpaceState::new(blend.clone()))
            }
        };

        if !desc.states.is_empty() && !matches!(kind, StateKind::Group) {
            return Err(ControllerError::InvalidTree(format!(
                "state '{}' has child states but is not a group",
                desc.name
            )));
        }

        let id = self.nodes.len();
        self.nodes
            .push(Node::new(&desc.name, NodeKind::State(kind), Some(parent)));

        for state in &desc.states {
            let child = self.build_state(state, id)?;
            self.nodes[id].children.push(child);
        }

        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn layers(&self) -> &[NodeId] {
        &self.layers
    }

    /// Node ids in wire order: each layer followed by its states depth-first.
    pub(crate) fn replication_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        for layer in &self.layers {
            order.push(*layer);
            self.push_states(*layer, &mut order);
        }
        order
    }

    fn push_states(&self, id: NodeId, order: &mut Vec<NodeId>) {
        for child in &self.nodes[id].children {
            order.push(*child);
            self.push_states(*child, order);
        }
    }

    // ---- lookup ----------------------------------------------------------

    pub fn find_layer(&self, name: &str) -> Option<NodeId> {
        self.layers
            .iter()
            .copied()
            .find(|id| self.nodes[*id].name == name)
    }

    pub fn find_state(&self, tag: StateKindTag) -> Option<NodeId> {
        for layer in &self.layers {
            if let Some(id) = self.find_state_in(*layer, &|node| {
                node.state_kind().is_some_and(|kind| kind.tag() == tag)
            }) {
                return Some(id);
            }
        }
        None
    }

    pub fn find_state_named(&self, name: &str) -> Option<NodeId> {
        for layer in &self.layers {
            if let Some(id) = self.find_state_in(*layer, &|node| node.name == name) {
                return Some(id);
            }
        }
        None
    }

    fn find_state_in(&self, id: NodeId, matches: &dyn Fn(&Node) -> bool) -> Option<NodeId> {
        for child in &self.nodes[id].children {
            if matches(&self.nodes[*child]) {
                return Some(*child);
            }
            if let Some(inner) = self.find_state_in(*child, matches) {
                return Some(inner);
            }
        }
        None
    }

    // ---- activation ------------------------------------------------------

    /// Fades a node in and fades out its competing siblings over the same
    /// duration. Activating a state under an interior group also activates
    /// the group chain up to the layer.
    pub fn activate(&mut self, id: NodeId, duration: f32) {
        self.activate_inner(id, duration, false);
    }

    /// Fades a node in without touching siblings or owners.
    pub fn activate_self(&mut self, id: NodeId, duration: f32) {
        self.activate_inner(id, duration, true);
    }

    pub fn deactivate(&mut self, id: NodeId, duration: f32) {
        self.deactivate_inner(id, duration, false);
    }

    pub fn deactivate_self(&mut self, id: NodeId, duration: f32) {
        self.deactivate_inner(id, duration, true);
    }

    fn activate_inner(&mut self, id: NodeId, duration: f32, self_only: bool) {
        let node = &mut self.nodes[id];
        if !node.fade.begin_fade_in(duration) {
            return;
        }
        debug!("activate {} ({:.3}s)", node.name, duration);

        if self_only {
            return;
        }

        if let Some(parent) = self.nodes[id].parent {
            self.child_activated(parent, id, duration);
        }
    }

    fn deactivate_inner(&mut self, id: NodeId, duration: f32, self_only: bool) {
        let node = &mut self.nodes[id];
        if !node.fade.begin_fade_out(duration) {
            return;
        }
        debug!("deactivate {} ({:.3}s)", node.name, duration);

        if self_only {
            return;
        }

        if let Some(parent) = self.nodes[id].parent {
            self.child_deactivated(parent, duration);
        }
    }

    fn child_activated(&mut self, owner: NodeId, source: NodeId, duration: f32) {
        for index in 0..self.nodes[owner].children.len() {
            let sibling = self.nodes[owner].children[index];
            if sibling != source {
                self.deactivate_inner(sibling, duration, true);
            }
        }

        if self.nodes[owner].is_layer() {
            return;
        }

        // An interior group joins the activation and propagates it upward.
        if self.nodes[owner].fade.begin_fade_in(duration) {
            debug!("activate {} ({:.3}s)", self.nodes[owner].name, duration);
        }

        if let Some(parent) = self.nodes[owner].parent {
            self.child_activated(parent, owner, duration);
        }
    }

    fn child_deactivated(&mut self, owner: NodeId, duration: f32) {
        if self.nodes[owner].is_layer() {
            return;
        }

        if self.nodes[owner].fade.begin_fade_out(duration) {
            debug!("deactivate {} ({:.3}s)", self.nodes[owner].name, duration);
        }

        if let Some(parent) = self.nodes[owner].parent {
            self.child_deactivated(parent, duration);
        }
    }

    pub fn deactivate_all_states(&mut self, owner: NodeId, duration: f32) {
        for index in 0..self.nodes[owner].children.len() {
            let child = self.nodes[owner].children[index];
            self.deactivate_inner(child, duration, true);
        }
    }

    // ---- predicates ------------------------------------------------------

    /// Active from the outside world's perspective: the node and its whole
    /// owner chain are active.
    pub fn is_active(&self, id: NodeId) -> bool {
        self.nodes[id].fade.is_active_self()
            && self.nodes[id]
                .parent
                .is_none_or(|parent| self.is_active(parent))
    }

    pub fn is_active_self(&self, id: NodeId) -> bool {
        self.nodes[id].fade.is_active_self()
    }

    pub fn is_playing(&self, id: NodeId) -> bool {
        self.nodes[id].fade.is_playing_self()
            && self.nodes[id]
                .parent
                .is_none_or(|parent| self.is_playing(parent))
    }

    pub fn is_playing_self(&self, id: NodeId) -> bool {
        self.nodes[id].fade.is_playing_self()
    }

    /// Fading in as observed from outside: the owner must itself be playing
    /// and not simultaneously on its way out.
    pub fn is_fading_in(&self, id: NodeId) -> bool {
        self.nodes[id].fade.is_fading_in_self()
            && self.nodes[id]
                .parent
                .is_none_or(|parent| self.is_playing(parent) && !self.is_fading_out(parent))
    }

    pub fn is_fading_out(&self, id: NodeId) -> bool {
        self.nodes[id].fade.is_fading_out_self()
            && self.nodes[id]
                .parent
                .is_none_or(|parent| self.is_playing(parent) && !self.is_fading_in(parent))
    }

    pub fn has_active_state(&self, owner: NodeId) -> bool {
        self.active_state(owner).is_some()
    }

    /// First child that is active in its own right.
    pub fn active_state(&self, owner: NodeId) -> Option<NodeId> {
        self.nodes[owner]
            .children
            .iter()
            .copied()
            .find(|child| self.nodes[*child].fade.is_active_self())
    }

    /// The state's clip content reached `normalized_time` while the state is
    /// still active.
    pub fn is_state_finished(&self, id: NodeId, normalized_time: f32) -> bool {
        let finished = match self.nodes[id].state_kind() {
            Some(StateKind::Clip(clip)) => clip.is_finished(normalized_time),
            Some(StateKind::MultiClip(multi)) => multi.is_finished(normalized_time),
            Some(StateKind::BlendSpace(blend)) => blend.is_finished(normalized_time),
            _ => false,
        };

        finished && self.is_active(id)
    }

    // ---- lifecycle -------------------------------------------------------

    pub(crate) fn spawn<G: PoseGraph>(
        &mut self,
        graph: &mut G,
        root_mixer: MixerId,
    ) -> Result<(), ControllerError> {
        for index in 0..self.layers.len() {
            let layer = self.layers[index];
            self.spawn_layer(layer, graph, root_mixer)?;
        }
        Ok(())
    }

    fn spawn_layer<G: PoseGraph>(
        &mut self,
        layer: NodeId,
        graph: &mut G,
        root_mixer: MixerId,
    ) -> Result<(), ControllerError> {
        let mixer = graph.create_mixer();

        let NodeKind::Layer(settings) = &self.nodes[layer].kind else {
            return Err(ControllerError::InvalidTree(format!(
                "node '{}' is not a layer",
                self.nodes[layer].name
            )));
        };
        let initial_weight = settings.initial_weight;
        let additive = settings.additive;
        let mask = settings.mask.clone();

        let port = graph
            .connect(root_mixer, GraphInput::Mixer(mixer), initial_weight)
            .ok_or(ControllerError::PortUnavailable)?;

        graph.set_additive(root_mixer, port, additive);
        if let Some(mask) = &mask {
            graph.set_mask(root_mixer, port, mask);
        }

        let node = &mut self.nodes[layer];
        node.mixer = Some(mixer);
        node.port = Some(port);
        node.fade.weight = initial_weight;
        node.fade.fading_speed = 0.0;
        node.fade.interpolated_weight = initial_weight;
        node.cached_weight = initial_weight;
        node.pending_weight = 0.0;

        for index in 0..self.nodes[layer].children.len() {
            let child = self.nodes[layer].children[index];
            self.spawn_state(child, graph, mixer)?;
        }

        Ok(())
    }

    fn spawn_state<G: PoseGraph>(
        &mut self,
        id: NodeId,
        graph: &mut G,
        owner_mixer: MixerId,
    ) -> Result<(), ControllerError> {
        let node = &mut self.nodes[id];
        node.fade = Default::default();
        node.cached_weight = 0.0;
        node.pending_weight = 0.0;

        let NodeKind::State(kind) = &mut node.kind else {
            return Err(ControllerError::InvalidTree(format!(
                "node '{}' is not a state",
                node.name
            )));
        };

        let input = kind.spawn(graph)?;
        if matches!(kind, StateKind::Group) {
            if let GraphInput::Mixer(mixer) = input {
                node.mixer = Some(mixer);
            }
        }

        let port = graph
            .connect(owner_mixer, input, 0.0)
            .ok_or(ControllerError::PortUnavailable)?;
        self.nodes[id].port = Some(port);

        if let Some(mixer) = self.nodes[id].mixer {
            for index in 0..self.nodes[id].children.len() {
                let child = self.nodes[id].children[index];
                self.spawn_state(child, graph, mixer)?;
            }
        }

        Ok(())
    }

    pub(crate) fn despawn<G: PoseGraph>(&mut self, graph: &mut G) {
        for index in 0..self.nodes.len() {
            let node = &mut self.nodes[index];
            if let NodeKind::State(kind) = &mut node.kind {
                kind.despawn(graph);
            }
            if let Some(mixer) = node.mixer.take() {
                graph.destroy_mixer(mixer);
            }
            node.port = None;
        }

        self.set_defaults();
    }

    pub(crate) fn set_defaults(&mut self) {
        for node in &mut self.nodes {
            node.fade.reset();
            node.fade.interpolated_weight = 0.0;
            node.cached_weight = 0.0;
            node.pending_weight = 0.0;
            if let NodeKind::State(kind) = &mut node.kind {
                kind.set_defaults();
            }
        }
    }

    // ---- fixed path ------------------------------------------------------

    /// Advances fades and per-kind clocks, children before parents. Subtrees
    /// with no weight and no fade in flight are skipped entirely.
    pub(crate) fn fixed_update<G: PoseGraph>(&mut self, dt: f32, graph: &mut G) {
        for index in 0..self.layers.len() {
            let layer = self.layers[index];
            let fade = self.nodes[layer].fade;
            if fade.fading_speed <= 0.0 && fade.weight <= 0.0 {
                continue;
            }

            for child_index in 0..self.nodes[layer].children.len() {
                let child = self.nodes[layer].children[child_index];
                self.fixed_update_state(child, dt, graph);
            }

            self.nodes[layer].fade.advance(dt);
        }
    }

    fn fixed_update_state<G: PoseGraph>(&mut self, id: NodeId, dt: f32, graph: &mut G) {
        let fade = self.nodes[id].fade;
        if fade.fading_speed <= 0.0 && fade.weight <= 0.0 {
            self.reset_subtree(id);
            return;
        }

        for index in 0..self.nodes[id].children.len() {
            let child = self.nodes[id].children[index];
            self.fixed_update_state(child, dt, graph);
        }

        self.nodes[id].fade.advance(dt);

        if let NodeKind::State(kind) = &mut self.nodes[id].kind {
            kind.fixed_update(dt, graph);
        }
    }

    fn reset_subtree(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.fade.reset();
        if let NodeKind::State(kind) = &mut node.kind {
            kind.set_defaults();
        }

        for index in 0..self.nodes[id].children.len() {
            let child = self.nodes[id].children[index];
            self.reset_subtree(child);
        }
    }

    // ---- render path -----------------------------------------------------

    /// Pushes render-side clip times and internal weights for every subtree
    /// that is visible at interpolated weights.
    pub(crate) fn interpolate_states<G: PoseGraph>(&mut self, graph: &mut G) {
        for index in 0..self.layers.len() {
            let layer = self.layers[index];
            self.interpolate_node(layer, graph);
        }
    }

    fn interpolate_node<G: PoseGraph>(&mut self, id: NodeId, graph: &mut G) {
        if self.nodes[id].fade.interpolated_weight <= 0.0 {
            return;
        }

        for index in 0..self.nodes[id].children.len() {
            let child = self.nodes[id].children[index];
            self.interpolate_node(child, graph);
        }

        if let NodeKind::State(kind) = &mut self.nodes[id].kind {
            kind.interpolate(graph);
        }
    }

    // ---- weight propagation ----------------------------------------------

    /// Recomputes every mixer input weight from either the authoritative or
    /// the interpolated weights and pushes changed values into the graph.
    pub(crate) fn set_playable_weights<G: PoseGraph>(
        &mut self,
        interpolated: bool,
        root_mixer: MixerId,
        graph: &mut G,
    ) {
        for index in 0..self.layers.len() {
            let layer = self.layers[index];
            self.set_layer_weights(layer, interpolated, root_mixer, graph);
        }
    }

    fn set_layer_weights<G: PoseGraph>(
        &mut self,
        layer: NodeId,
        interpolated: bool,
        root_mixer: MixerId,
        graph: &mut G,
    ) {
        let layer_weight = self.select_weight(layer, interpolated);
        if layer_weight <= 0.0 {
            self.write_port_weight(layer, root_mixer, 0.0, graph);
            return;
        }

        let count = self.nodes[layer].children.len();
        if count == 0 {
            self.write_port_weight(layer, root_mixer, layer_weight, graph);
            return;
        }

        let Some(mixer) = self.nodes[layer].mixer else {
            return;
        };

        if count == 1 {
            let child = self.nodes[layer].children[0];
            let (contribution, max_child_weight) =
                self.calculate_state_weights(child, interpolated, graph);
            let binary = if contribution > 0.0 { 1.0 } else { 0.0 };
            self.write_port_weight(child, mixer, binary, graph);
            self.write_port_weight(layer, root_mixer, max_child_weight * layer_weight, graph);
            return;
        }

        let mut max_weight = 0.0f32;
        let mut children_weight = 0.0f32;

        for index in 0..count {
            let child = self.nodes[layer].children[index];
            let (contribution, max_child_weight) =
                self.calculate_state_weights(child, interpolated, graph);
            children_weight += contribution;
            if max_child_weight > max_weight {
                max_weight = max_child_weight;
            }
        }

        if children_weight == 1.0 || children_weight == 0.0 {
            for index in 0..count {
                let child = self.nodes[layer].children[index];
                self.apply_pending_weight(child, 1.0, mixer, graph);
            }
        } else {
            let multiplier = 1.0 / children_weight;
            for index in 0..count {
                let child = self.nodes[layer].children[index];
                self.apply_pending_weight(child, multiplier, mixer, graph);
            }
            if children_weight > 1.0 {
                children_weight = 1.0;
            }
        }

        if children_weight > max_weight {
            max_weight = children_weight;
        }

        self.write_port_weight(layer, root_mixer, max_weight * layer_weight, graph);
    }

    /// Returns (contribution, max descendant weight). The contribution feeds
    /// the owner's renormalization; the max survives clamping so dominance
    /// queries still see the strongest descendant.
    fn calculate_state_weights<G: PoseGraph>(
        &mut self,
        id: NodeId,
        interpolated: bool,
        graph: &mut G,
    ) -> (f32, f32) {
        let state_weight = self.select_weight(id, interpolated);
        if state_weight <= 0.0 {
            self.nodes[id].pending_weight = 0.0;
            return (0.0, 0.0);
        }

        let count = self.nodes[id].children.len();
        if count == 0 {
            self.nodes[id].pending_weight = state_weight;
            return (state_weight, state_weight);
        }

        let Some(mixer) = self.nodes[id].mixer else {
            return (0.0, 0.0);
        };

        if count == 1 {
            let child = self.nodes[id].children[0];
            let (contribution, max_child_weight) =
                self.calculate_state_weights(child, interpolated, graph);
            // A sole child under a blended node always gets full relative
            // weight; the child's raw contribution becomes this node's.
            self.nodes[id].pending_weight = contribution;
            let binary = if contribution > 0.0 { 1.0 } else { 0.0 };
            self.write_port_weight(child, mixer, binary, graph);
            return (state_weight, max_child_weight);
        }

        let mut max_weight = 0.0f32;
        let mut children_weight = 0.0f32;

        for index in 0..count {
            let child = self.nodes[id].children[index];
            let (contribution, max_child_weight) =
                self.calculate_state_weights(child, interpolated, graph);
            children_weight += contribution;
            if max_child_weight > max_weight {
                max_weight = max_child_weight;
            }
        }

        if children_weight == 1.0 || children_weight == 0.0 {
            for index in 0..count {
                let child = self.nodes[id].children[index];
                self.apply_pending_weight(child, 1.0, mixer, graph);
            }
        } else {
            let multiplier = 1.0 / children_weight;
            for index in 0..count {
                let child = self.nodes[id].children[index];
                self.apply_pending_weight(child, multiplier, mixer, graph);
            }
            // The clamp only affects the weight reported upward; the mixer
            // writes above keep the renormalized values.
            if children_weight > 1.0 {
                children_weight = 1.0;
            }
        }

        if children_weight > max_weight {
            max_weight = children_weight;
        }

        self.nodes[id].pending_weight = children_weight;

        (state_weight, max_weight)
    }

    fn select_weight(&self, id: NodeId, interpolated: bool) -> f32 {
        let fade = &self.nodes[id].fade;
        if interpolated {
            fade.interpolated_weight
        } else {
            fade.weight
        }
    }

    fn apply_pending_weight<G: PoseGraph>(
        &mut self,
        id: NodeId,
        multiplier: f32,
        mixer: MixerId,
        graph: &mut G,
    ) {
        let weight = self.nodes[id].pending_weight * multiplier;
        self.write_port_weight(id, mixer, weight, graph);
    }

    fn write_port_weight<G: PoseGraph>(
        &mut self,
        id: NodeId,
        mixer: MixerId,
        weight: f32,
        graph: &mut G,
    ) {
        let node = &mut self.nodes[id];
        if weight == node.cached_weight {
            return;
        }
        node.cached_weight = weight;

        let Some(port) = node.port else {
            return;
        };
        graph.set_input_weight(mixer, port, weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DebugGraph;
    use crate::state::ClipDesc;
    use crate::tree::desc::{LayerDesc, StateDesc};

    fn clip(name: &str) -> StateDesc {
        StateDesc::clip(name, ClipDesc::new(name, 1.0, true))
    }

    fn two_state_tree() -> (AnimationTree, DebugGraph, MixerId) {
        let desc = ControllerDesc {
            layers: vec![LayerDesc::new("locomotion", vec![clip("idle"), clip("run")])],
        };
        let mut tree = AnimationTree::build(&desc).unwrap();
        let mut graph = DebugGraph::new();
        let root = graph.create_mixer();
        tree.spawn(&mut graph, root).unwrap();
        (tree, graph, root)
    }

    #[test]
    fn build_rejects_children_under_leaf_states() {
        let desc = ControllerDesc {
            layers: vec![LayerDesc::new(
                "broken",
                vec![StateDesc {
                    name: "leaf".to_string(),
                    kind: StateKindDesc::Clip(ClipDesc::new("leaf", 1.0, false)),
                    states: vec![clip("child")],
                }],
            )],
        };

        assert!(matches!(
            AnimationTree::build(&desc),
            Err(ControllerError::InvalidTree(_))
        ));
    }

    #[test]
    fn activation_scenario_reaches_full_weight() {
        let (mut tree, mut graph, _root) = two_state_tree();
        let idle = tree.find_state_named("idle").unwrap();
        let run = tree.find_state_named("run").unwrap();

        tree.activate(idle, 1.0);

        for _ in 0..5 {
            tree.fixed_update(0.1, &mut graph);
        }

        assert!((tree.node(idle).fade.weight - 0.5).abs() < 1e-5);
        assert_eq!(tree.node(idle).fade.fading_speed, 1.0);
        assert_eq!(tree.node(run).fade.weight, 0.0);

        for _ in 0..10 {
            tree.fixed_update(0.1, &mut graph);
        }

        assert_eq!(tree.node(idle).fade.weight, 1.0);
        assert_eq!(tree.node(idle).fade.fading_speed, 0.0);
    }

    #[test]
    fn activation_fades_out_siblings() {
        let (mut tree, mut graph, _root) = two_state_tree();
        let idle = tree.find_state_named("idle").unwrap();
        let run = tree.find_state_named("run").unwrap();

        tree.activate(idle, 0.0);
        tree.fixed_update(0.1, &mut graph);
        assert_eq!(tree.node(idle).fade.weight, 1.0);

        tree.activate(run, 0.5);
        assert_eq!(tree.node(run).fade.fading_speed, 2.0);
        assert_eq!(tree.node(idle).fade.fading_speed, -2.0);
    }

    #[test]
    fn self_activation_leaves_siblings_alone() {
        let (mut tree, mut graph, _root) = two_state_tree();
        let idle = tree.find_state_named("idle").unwrap();
        let run = tree.find_state_named("run").unwrap();

        tree.activate(idle, 0.0);
        tree.fixed_update(0.1, &mut graph);

        tree.activate_self(run, 0.5);
        assert_eq!(tree.node(idle).fade.fading_speed, 0.0);
        assert_eq!(tree.node(idle).fade.weight, 1.0);
    }

    #[test]
    fn group_activation_propagates_to_owner_chain() {
        let desc = ControllerDesc {
            layers: vec![LayerDesc::new(
                "actions",
                vec![StateDesc::group("melee", vec![clip("swing"), clip("stab")])],
            )],
        };
        let mut tree = AnimationTree::build(&desc).unwrap();
        let mut graph = DebugGraph::new();
        let root = graph.create_mixer();
        tree.spawn(&mut graph, root).unwrap();

        let melee = tree.find_state_named("melee").unwrap();
        let swing = tree.find_state_named("swing").unwrap();
        let stab = tree.find_state_named("stab").unwrap();

        tree.activate(swing, 0.2);

        assert!(tree.node(melee).fade.is_fading_in_self());
        assert!(tree.node(swing).fade.is_fading_in_self());
        assert_eq!(tree.node(stab).fade.fading_speed, 0.0);

        tree.deactivate(swing, 0.2);
        assert!(tree.node(melee).fade.is_fading_out_self());
    }

    #[test]
    fn owner_conditioned_predicates() {
        let desc = ControllerDesc {
            layers: vec![LayerDesc::new(
                "actions",
                vec![StateDesc::group("melee", vec![clip("swing")])],
            )],
        };
        let mut tree = AnimationTree::build(&desc).unwrap();
        let mut graph = DebugGraph::new();
        let root = graph.create_mixer();
        tree.spawn(&mut graph, root).unwrap();

        let layer = tree.find_layer("actions").unwrap();
        let swing = tree.find_state_named("swing").unwrap();

        tree.activate_self(swing, 0.0);

        // Layer never activated: the subtree is active in self mode only.
        assert!(tree.is_active_self(swing));
        assert!(!tree.is_active(swing));

        tree.activate(layer, 0.0);
        // The group still has zero weight, so the chain is broken there.
        assert!(!tree.is_active(swing));

        let melee = tree.find_state_named("melee").unwrap();
        tree.activate_self(melee, 0.0);
        assert!(tree.is_active(swing));
    }

    #[test]
    fn fading_in_needs_playing_owner_that_is_not_fading_out() {
        let (mut tree, mut graph, _root) = two_state_tree();
        let layer = tree.find_layer("locomotion").unwrap();
        let idle = tree.find_state_named("idle").unwrap();

        tree.activate(layer, 0.0);
        tree.activate(idle, 1.0);
        assert!(tree.is_fading_in(idle));

        tree.deactivate(layer, 1.0);
        assert!(!tree.is_fading_in(idle));

        tree.fixed_update(2.0, &mut graph);
        assert!(!tree.is_fading_in(idle));
    }

    #[test]
    fn renormalization_scales_over_summed_children() {
        let desc = ControllerDesc {
            layers: vec![LayerDesc::new(
                "locomotion",
                vec![clip("a"), clip("b"), clip("c")],
            )],
        };
        let mut tree = AnimationTree::build(&desc).unwrap();
        let mut graph = DebugGraph::new();
        let root = graph.create_mixer();
        tree.spawn(&mut graph, root).unwrap();

        let layer = tree.find_layer("locomotion").unwrap();
        let a = tree.find_state_named("a").unwrap();
        let b = tree.find_state_named("b").unwrap();
        let c = tree.find_state_named("c").unwrap();

        tree.node_mut(layer).fade.weight = 1.0;
        tree.node_mut(a).fade.weight = 0.6;
        tree.node_mut(b).fade.weight = 0.6;
        tree.node_mut(c).fade.weight = 0.3;

        tree.set_playable_weights(false, root, &mut graph);

        let mixer = tree.node(layer).mixer.unwrap();
        assert!((graph.input_weight(mixer, 0) - 0.4).abs() < 1e-5);
        assert!((graph.input_weight(mixer, 1) - 0.4).abs() < 1e-5);
        assert!((graph.input_weight(mixer, 2) - 0.2).abs() < 1e-5);

        // Sum clamps to 1, which beats the strongest raw child (0.6).
        assert_eq!(graph.input_weight(root, tree.node(layer).port.unwrap()), 1.0);
    }

    #[test]
    fn exact_sum_skips_renormalization() {
        let (mut tree, mut graph, root) = two_state_tree();
        let layer = tree.find_layer("locomotion").unwrap();
        let idle = tree.find_state_named("idle").unwrap();
        let run = tree.find_state_named("run").unwrap();

        tree.node_mut(layer).fade.weight = 1.0;
        tree.node_mut(idle).fade.weight = 0.25;
        tree.node_mut(run).fade.weight = 0.75;

        tree.set_playable_weights(false, root, &mut graph);

        let mixer = tree.node(layer).mixer.unwrap();
        assert_eq!(graph.input_weight(mixer, 0), 0.25);
        assert_eq!(graph.input_weight(mixer, 1), 0.75);
        assert_eq!(graph.input_weight(root, tree.node(layer).port.unwrap()), 1.0);
    }

    #[test]
    fn single_child_gets_binary_weight() {
        let desc = ControllerDesc {
            layers: vec![LayerDesc::new("solo", vec![clip("only")])],
        };
        let mut tree = AnimationTree::build(&desc).unwrap();
        let mut graph = DebugGraph::new();
        let root = graph.create_mixer();
        tree.spawn(&mut graph, root).unwrap();

        let layer = tree.find_layer("solo").unwrap();
        let only = tree.find_state_named("only").unwrap();

        tree.node_mut(layer).fade.weight = 1.0;
        tree.node_mut(only).fade.weight = 0.3;

        tree.set_playable_weights(false, root, &mut graph);

        let mixer = tree.node(layer).mixer.unwrap();
        assert_eq!(graph.input_weight(mixer, 0), 1.0);
        // Layer reports the child's own weight upward.
        assert!(
            (graph.input_weight(root, tree.node(layer).port.unwrap()) - 0.3).abs() < 1e-6
        );
    }

    #[test]
    fn mixer_weights_stay_bounded() {
        let desc = ControllerDesc {
            layers: vec![LayerDesc::new(
                "stack",
                vec![
                    StateDesc::group("group", vec![clip("a"), clip("b")]),
                    clip("c"),
                ],
            )],
        };
        let mut tree = AnimationTree::build(&desc).unwrap();
        let mut graph = DebugGraph::new();
        let root = graph.create_mixer();
        tree.spawn(&mut graph, root).unwrap();

        for id in 0..tree.len() {
            tree.node_mut(id).fade.weight = 0.9;
        }

        tree.set_playable_weights(false, root, &mut graph);

        let layer = tree.find_layer("stack").unwrap();
        let mixer = tree.node(layer).mixer.unwrap();
        for port in 0..graph.input_count(mixer) {
            let weight = graph.input_weight(mixer, port as u32);
            assert!((0.0..=1.0 + 1e-5).contains(&weight));
        }
        let layer_weight = graph.input_weight(root, tree.node(layer).port.unwrap());
        assert!((0.0..=1.0 + 1e-5).contains(&layer_weight));
    }

    #[test]
    fn active_state_reports_strongest_sibling_queries() {
        let (mut tree, mut graph, _root) = two_state_tree();
        let layer = tree.find_layer("locomotion").unwrap();
        let run = tree.find_state_named("run").unwrap();

        assert!(!tree.has_active_state(layer));

        tree.activate(run, 0.0);
        tree.fixed_update(0.1, &mut graph);

        assert!(tree.has_active_state(layer));
        assert_eq!(tree.active_state(layer), Some(run));
    }

    #[test]
    fn inactive_subtree_resets_clip_time() {
        let (mut tree, mut graph, _root) = two_state_tree();
        let idle = tree.find_state_named("idle").unwrap();

        tree.activate(idle, 0.0);
        for _ in 0..3 {
            tree.fixed_update(0.1, &mut graph);
        }
        assert!(tree.node(idle).clip().unwrap().time > 0.0);

        tree.deactivate(idle, 0.0);
        tree.fixed_update(0.1, &mut graph);
        assert_eq!(tree.node(idle).clip().unwrap().time, 0.0);
    }

    #[test]
    fn replication_order_is_depth_first_per_layer() {
        let desc = ControllerDesc {
            layers: vec![
                LayerDesc::new(
                    "first",
                    vec![StateDesc::group("group", vec![clip("inner")]), clip("flat")],
                ),
                LayerDesc::new("second", vec![clip("solo")]),
            ],
        };
        let tree = AnimationTree::build(&desc).unwrap();

        let order = tree.replication_order();
        let names: Vec<&str> = order.iter().map(|id| tree.node(*id).name.as_str()).collect();
        assert_eq!(
            names,
            vec!["first", "group", "inner", "flat", "second", "solo"]
        );
    }
}
