use log::debug;

use crate::graph::{MixerId, PoseGraph};
use crate::net::{CodecTable, ControllerFlags, ReplicatedStatus, SnapshotBuffer};
use crate::state::StateKindTag;
use crate::tree::{AnimationTree, ControllerDesc, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("invalid tree: {0}")]
    InvalidTree(String),
    #[error("{0} must not be negative")]
    NegativeArgument(&'static str),
    #[error("manual update is not set")]
    ManualUpdateDisabled,
    #[error("entry point called outside its scheduling stage")]
    WrongStage,
    #[error("controller is not spawned")]
    NotSpawned,
    #[error("controller is already spawned")]
    AlreadySpawned,
    #[error("state failed to acquire a mixer port")]
    PortUnavailable,
    #[error("buffer holds {actual} words, expected {expected}")]
    WordCountMismatch { expected: usize, actual: usize },
    #[error("only the authority may write replicated state")]
    NotAuthoritative,
}

/// Which authority this copy of the object holds. Proxies hold neither and
/// only ever consume replicated state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Authority {
    pub input: bool,
    pub state: bool,
}

impl Authority {
    pub const PROXY: Self = Self {
        input: false,
        state: false,
    };
    pub const INPUT: Self = Self {
        input: true,
        state: false,
    };
    pub const STATE: Self = Self {
        input: false,
        state: true,
    };

    pub fn has_any(&self) -> bool {
        self.input || self.state
    }

    fn flags(&self) -> ControllerFlags {
        let mut flags = ControllerFlags::empty();
        flags.set(ControllerFlags::INPUT_AUTHORITY, self.input);
        flags.set(ControllerFlags::STATE_AUTHORITY, self.state);
        flags
    }
}

/// Scheduling stage the external tick engine has put us in. Fixed entry
/// points are only legal between `begin_ticks` and `end_ticks`; render entry
/// points only outside that bracket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Idle,
    Ticking,
}

#[derive(Debug, Clone, Copy)]
pub struct FixedContext {
    pub tick: u32,
    pub delta_time: f32,
    pub resimulation: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    pub delta_time: f32,
    /// Fraction of a fixed step elapsed since the last tick.
    pub alpha: f32,
}

/// Owns the pose graph, the blend tree and the codec table, and glues the two
/// update rates together. Driven entirely by external callbacks; never blocks
/// and never retries.
#[derive(Debug)]
pub struct Controller<G: PoseGraph> {
    graph: G,
    tree: AnimationTree,
    codec: CodecTable,
    root_mixer: Option<MixerId>,
    status: ReplicatedStatus,
    authority: Authority,
    stage: Stage,
    is_spawned: bool,
    has_manual_update: bool,
    suppress_evaluation: bool,
    evaluation_frame: i32,
    evaluation_rate: i32,
    evaluation_seed: i32,
    state_alpha: f32,
    delta_time: f32,
}

impl<G: PoseGraph> Controller<G> {
    pub fn new(desc: &ControllerDesc, graph: G) -> Result<Self, ControllerError> {
        let tree = AnimationTree::build(desc)?;
        let codec = CodecTable::build(&tree);

        Ok(Self {
            graph,
            tree,
            codec,
            root_mixer: None,
            status: ReplicatedStatus::default(),
            authority: Authority::PROXY,
            stage: Stage::Idle,
            is_spawned: false,
            has_manual_update: false,
            suppress_evaluation: false,
            evaluation_frame: 0,
            evaluation_rate: 0,
            evaluation_seed: 0,
            state_alpha: 1.0,
            delta_time: 0.0,
        })
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn tree(&self) -> &AnimationTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut AnimationTree {
        &mut self.tree
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn is_proxy(&self) -> bool {
        !self.authority.has_any()
    }

    pub fn is_spawned(&self) -> bool {
        self.is_spawned
    }

    pub fn state_alpha(&self) -> f32 {
        self.state_alpha
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn has_manual_update(&self) -> bool {
        self.has_manual_update
    }

    // ---- configuration ---------------------------------------------------

    pub fn set_manual_update(&mut self, has_manual_update: bool) {
        self.has_manual_update = has_manual_update;
    }

    pub fn suppress_evaluation(&mut self, suppress: bool) {
        self.suppress_evaluation = suppress;
    }

    pub fn set_evaluation_frame(&mut self, frame: i32) -> Result<(), ControllerError> {
        if frame < 0 {
            return Err(ControllerError::NegativeArgument("evaluation frame"));
        }
        self.evaluation_frame = frame;
        Ok(())
    }

    pub fn set_evaluation_rate(&mut self, rate: i32) -> Result<(), ControllerError> {
        if rate < 0 {
            return Err(ControllerError::NegativeArgument("evaluation rate"));
        }
        self.evaluation_rate = rate;
        Ok(())
    }

    pub fn set_evaluation_seed(&mut self, seed: i32) -> Result<(), ControllerError> {
        if seed < 0 {
            return Err(ControllerError::NegativeArgument("evaluation seed"));
        }
        self.evaluation_seed = seed;
        Ok(())
    }

    // ---- lifecycle -------------------------------------------------------

    /// Creates the per-session backend resources: the root mixer, one mixer
    /// per layer and group, leaf sources, and every input port. A state that
    /// cannot acquire a port aborts the spawn.
    pub fn spawned(&mut self, authority: Authority) -> Result<(), ControllerError> {
        if self.is_spawned {
            return Err(ControllerError::AlreadySpawned);
        }

        let root_mixer = self.graph.create_mixer();
        self.tree.spawn(&mut self.graph, root_mixer)?;

        self.root_mixer = Some(root_mixer);
        self.authority = authority;
        self.status = ReplicatedStatus {
            tick: 0,
            flags: authority.flags(),
        };
        self.state_alpha = 1.0;
        self.is_spawned = true;

        debug!(
            "spawned: {} nodes, {} replicated words",
            self.tree.len(),
            self.codec.word_count()
        );

        Ok(())
    }

    pub fn despawned(&mut self) {
        if !self.is_spawned {
            return;
        }

        self.tree.despawn(&mut self.graph);
        if let Some(root_mixer) = self.root_mixer.take() {
            self.graph.destroy_mixer(root_mixer);
        }

        self.is_spawned = false;
        self.has_manual_update = false;
        self.suppress_evaluation = false;
        self.evaluation_frame = 0;
        self.evaluation_rate = 0;
        self.evaluation_seed = 0;
        self.authority = Authority::PROXY;
        self.stage = Stage::Idle;
    }

    // ---- transport-facing ------------------------------------------------

    /// Total size of this object's slice of the replication buffer.
    pub fn word_count(&self) -> usize {
        self.codec.word_count()
    }

    /// Applies an authoritative snapshot to live state, e.g. when entering
    /// resimulation.
    pub fn read(&mut self, words: &[u32]) -> Result<(), ControllerError> {
        if !self.is_spawned {
            return Err(ControllerError::NotSpawned);
        }
        self.check_word_count(words.len())?;

        self.codec.read(&mut self.tree, &mut self.status, words);
        Ok(())
    }

    /// Serializes live state into the replication buffer. Authority only,
    /// once after every forward tick.
    pub fn write(&self, words: &mut [u32]) -> Result<(), ControllerError> {
        if !self.is_spawned {
            return Err(ControllerError::NotSpawned);
        }
        if !self.authority.has_any() {
            return Err(ControllerError::NotAuthoritative);
        }
        self.check_word_count(words.len())?;

        self.codec.write(&self.tree, &self.status, words);
        Ok(())
    }

    /// Blends two buffered snapshots into the render-side fields.
    pub fn interpolate_between(
        &mut self,
        from: &[u32],
        to: &[u32],
        alpha: f32,
    ) -> Result<(), ControllerError> {
        if !self.is_spawned {
            return Err(ControllerError::NotSpawned);
        }
        self.check_word_count(from.len())?;
        self.check_word_count(to.len())?;

        self.codec.interpolate(&mut self.tree, from, to, alpha);
        Ok(())
    }

    fn check_word_count(&self, actual: usize) -> Result<(), ControllerError> {
        let expected = self.codec.word_count();
        if actual != expected {
            return Err(ControllerError::WordCountMismatch { expected, actual });
        }
        Ok(())
    }

    // ---- fixed path ------------------------------------------------------

    /// Enters the fixed-update bracket. When resimulating, the authoritative
    /// snapshot is applied before any step runs.
    pub fn begin_ticks(
        &mut self,
        resimulation: bool,
        words: Option<&[u32]>,
    ) -> Result<(), ControllerError> {
        if !self.is_spawned {
            return Err(ControllerError::NotSpawned);
        }
        if self.stage != Stage::Idle {
            return Err(ControllerError::WrongStage);
        }

        if resimulation {
            if let Some(words) = words {
                self.read(words)?;
            }
        }

        self.stage = Stage::Ticking;
        Ok(())
    }

    pub fn end_ticks(&mut self) -> Result<(), ControllerError> {
        if self.stage != Stage::Ticking {
            return Err(ControllerError::WrongStage);
        }
        self.stage = Stage::Idle;
        Ok(())
    }

    /// One authoritative fixed step: fades advance bottom-up, then the mixer
    /// weights are recomputed from the authoritative weights. No-op when the
    /// controller is in manual-update mode or holds no authority.
    pub fn fixed_update(&mut self, ctx: &FixedContext) -> Result<(), ControllerError> {
        if self.has_manual_update {
            return Ok(());
        }
        self.fixed_update_internal(ctx)
    }

    pub fn manual_fixed_update(&mut self, ctx: &FixedContext) -> Result<(), ControllerError> {
        if !self.has_manual_update {
            return Err(ControllerError::ManualUpdateDisabled);
        }
        self.fixed_update_internal(ctx)
    }

    fn fixed_update_internal(&mut self, ctx: &FixedContext) -> Result<(), ControllerError> {
        if self.stage != Stage::Ticking {
            return Err(ControllerError::WrongStage);
        }
        if !self.authority.has_any() {
            return Ok(());
        }

        self.state_alpha = 1.0;
        self.delta_time = ctx.delta_time;
        self.status.tick = ctx.tick;
        self.status.flags = self.authority.flags();

        self.tree.fixed_update(ctx.delta_time, &mut self.graph);

        if let Some(root_mixer) = self.root_mixer {
            self.tree
                .set_playable_weights(false, root_mixer, &mut self.graph);
        }

        Ok(())
    }

    // ---- render path -----------------------------------------------------

    /// One cosmetic render step: interpolates the two most recent snapshots
    /// into the render-side fields, recomputes mixer weights from them and
    /// evaluates the backend, subject to the evaluation throttle. No-op in
    /// manual-update mode.
    pub fn render_update(
        &mut self,
        ctx: &RenderContext,
        history: &SnapshotBuffer,
    ) -> Result<(), ControllerError> {
        if self.has_manual_update {
            return Ok(());
        }
        self.render_update_internal(ctx, history)
    }

    pub fn manual_render_update(
        &mut self,
        ctx: &RenderContext,
        history: &SnapshotBuffer,
    ) -> Result<(), ControllerError> {
        if !self.has_manual_update {
            return Err(ControllerError::ManualUpdateDisabled);
        }
        self.render_update_internal(ctx, history)
    }

    fn render_update_internal(
        &mut self,
        ctx: &RenderContext,
        history: &SnapshotBuffer,
    ) -> Result<(), ControllerError> {
        if self.stage != Stage::Idle {
            return Err(ControllerError::WrongStage);
        }
        if !self.is_spawned {
            return Err(ControllerError::NotSpawned);
        }

        self.state_alpha = ctx.alpha;
        self.delta_time = ctx.delta_time;

        self.interpolate_pass(history, ctx.alpha)?;
        self.evaluate(true);
        Ok(())
    }

    /// Forced out-of-band refresh: the same interpolate → recompute →
    /// evaluate sequence as the render path, bypassing the throttle.
    pub fn interpolate(
        &mut self,
        history: &SnapshotBuffer,
        alpha: f32,
    ) -> Result<(), ControllerError> {
        if !self.is_spawned {
            return Err(ControllerError::NotSpawned);
        }

        self.interpolate_pass(history, alpha)?;
        self.evaluate(false);
        Ok(())
    }

    fn interpolate_pass(
        &mut self,
        history: &SnapshotBuffer,
        alpha: f32,
    ) -> Result<(), ControllerError> {
        if let Some((from, to)) = history.interpolation_pair() {
            self.interpolate_between(&from.words, &to.words, alpha)?;
        }

        self.tree.interpolate_states(&mut self.graph);

        if let Some(root_mixer) = self.root_mixer {
            self.tree
                .set_playable_weights(true, root_mixer, &mut self.graph);
        }

        Ok(())
    }

    fn evaluate(&mut self, check_rate: bool) {
        if self.suppress_evaluation {
            return;
        }

        if check_rate && self.evaluation_rate > 1 {
            let rate_seed = self.evaluation_seed % self.evaluation_rate;
            let target_seed = self.evaluation_frame % self.evaluation_rate;
            if rate_seed != target_seed {
                return;
            }
        }

        self.graph.evaluate();
    }

    // ---- caller-facing tree API ------------------------------------------

    pub fn activate(&mut self, state: NodeId, duration: f32) {
        self.tree.activate(state, duration);
    }

    pub fn activate_self(&mut self, state: NodeId, duration: f32) {
        self.tree.activate_self(state, duration);
    }

    pub fn deactivate(&mut self, state: NodeId, duration: f32) {
        self.tree.deactivate(state, duration);
    }

    pub fn deactivate_self(&mut self, state: NodeId, duration: f32) {
        self.tree.deactivate_self(state, duration);
    }

    pub fn is_active(&self, state: NodeId) -> bool {
        self.tree.is_active(state)
    }

    pub fn is_playing(&self, state: NodeId) -> bool {
        self.tree.is_playing(state)
    }

    pub fn is_fading_in(&self, state: NodeId) -> bool {
        self.tree.is_fading_in(state)
    }

    pub fn is_fading_out(&self, state: NodeId) -> bool {
        self.tree.is_fading_out(state)
    }

    pub fn find_layer(&self, name: &str) -> Option<NodeId> {
        self.tree.find_layer(name)
    }

    pub fn find_state(&self, tag: StateKindTag) -> Option<NodeId> {
        self.tree.find_state(tag)
    }

    pub fn find_state_named(&self, name: &str) -> Option<NodeId> {
        self.tree.find_state_named(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DebugGraph, GraphInput, LayerMask, Port, SourceId};
    use crate::net::Snapshot;
    use crate::state::ClipDesc;
    use crate::tree::{LayerDesc, StateDesc};

    fn sample_desc() -> ControllerDesc {
        ControllerDesc {
            layers: vec![LayerDesc::new(
                "locomotion",
                vec![
                    StateDesc::clip("idle", ClipDesc::new("idle", 1.0, true)),
                    StateDesc::clip("run", ClipDesc::new("run", 0.8, true)),
                ],
            )],
        }
    }

    fn spawned_controller() -> Controller<DebugGraph> {
        let mut controller = Controller::new(&sample_desc(), DebugGraph::new()).unwrap();
        controller.spawned(Authority::STATE).unwrap();
        controller
    }

    fn step(controller: &mut Controller<DebugGraph>, tick: u32, dt: f32) {
        controller.begin_ticks(false, None).unwrap();
        controller
            .fixed_update(&FixedContext {
                tick,
                delta_time: dt,
                resimulation: false,
            })
            .unwrap();
        controller.end_ticks().unwrap();
    }

    #[test]
    fn negative_evaluation_settings_are_rejected() {
        let mut controller = spawned_controller();
        assert!(matches!(
            controller.set_evaluation_frame(-1),
            Err(ControllerError::NegativeArgument(_))
        ));
        assert!(matches!(
            controller.set_evaluation_rate(-3),
            Err(ControllerError::NegativeArgument(_))
        ));
        assert!(matches!(
            controller.set_evaluation_seed(-7),
            Err(ControllerError::NegativeArgument(_))
        ));
        assert!(controller.set_evaluation_rate(4).is_ok());
    }

    #[test]
    fn manual_entry_points_require_manual_mode() {
        let mut controller = spawned_controller();
        controller.begin_ticks(false, None).unwrap();

        let ctx = FixedContext {
            tick: 1,
            delta_time: 1.0 / 60.0,
            resimulation: false,
        };
        assert!(matches!(
            controller.manual_fixed_update(&ctx),
            Err(ControllerError::ManualUpdateDisabled)
        ));

        controller.set_manual_update(true);
        assert!(controller.manual_fixed_update(&ctx).is_ok());
        // The scheduler-driven entry point becomes a no-op instead.
        assert!(controller.fixed_update(&ctx).is_ok());
    }

    #[test]
    fn entry_points_respect_the_stage_bracket() {
        let mut controller = spawned_controller();
        let ctx = FixedContext {
            tick: 1,
            delta_time: 1.0 / 60.0,
            resimulation: false,
        };

        assert!(matches!(
            controller.fixed_update(&ctx),
            Err(ControllerError::WrongStage)
        ));

        controller.begin_ticks(false, None).unwrap();
        assert!(matches!(
            controller.begin_ticks(false, None),
            Err(ControllerError::WrongStage)
        ));

        let history = SnapshotBuffer::new(4);
        let render = RenderContext {
            delta_time: 1.0 / 120.0,
            alpha: 0.5,
        };
        assert!(matches!(
            controller.render_update(&render, &history),
            Err(ControllerError::WrongStage)
        ));

        controller.end_ticks().unwrap();
        assert!(matches!(
            controller.end_ticks(),
            Err(ControllerError::WrongStage)
        ));
        assert!(controller.render_update(&render, &history).is_ok());
    }

    #[test]
    fn proxies_may_not_write() {
        let mut controller = Controller::new(&sample_desc(), DebugGraph::new()).unwrap();
        controller.spawned(Authority::PROXY).unwrap();

        let mut words = vec![0u32; controller.word_count()];
        assert!(matches!(
            controller.write(&mut words),
            Err(ControllerError::NotAuthoritative)
        ));
    }

    #[test]
    fn word_count_is_validated() {
        let mut controller = spawned_controller();
        let mut words = vec![0u32; controller.word_count() + 1];
        assert!(matches!(
            controller.write(&mut words),
            Err(ControllerError::WordCountMismatch { .. })
        ));
        assert!(matches!(
            controller.read(&words),
            Err(ControllerError::WordCountMismatch { .. })
        ));
    }

    #[test]
    fn evaluation_throttle_skips_mismatched_frames() {
        let mut controller = spawned_controller();
        controller.set_evaluation_rate(3).unwrap();
        controller.set_evaluation_seed(1).unwrap();

        let history = SnapshotBuffer::new(4);
        let render = RenderContext {
            delta_time: 1.0 / 120.0,
            alpha: 0.0,
        };

        for frame in 0..6 {
            controller.set_evaluation_frame(frame).unwrap();
            controller.render_update(&render, &history).unwrap();
        }

        // Only frames 1 and 4 match seed 1 modulo rate 3.
        assert_eq!(controller.graph().evaluations(), 2);
    }

    #[test]
    fn suppression_skips_evaluation_but_not_bookkeeping() {
        let mut controller = spawned_controller();
        controller.suppress_evaluation(true);

        let idle = controller.find_state_named("idle").unwrap();
        controller.activate(idle, 0.0);
        step(&mut controller, 1, 1.0 / 60.0);

        let history = SnapshotBuffer::new(4);
        controller
            .render_update(
                &RenderContext {
                    delta_time: 1.0 / 120.0,
                    alpha: 0.0,
                },
                &history,
            )
            .unwrap();

        assert_eq!(controller.graph().evaluations(), 0);
        assert_eq!(controller.tree().node(idle).fade.weight, 1.0);
    }

    #[test]
    fn forced_interpolate_bypasses_the_throttle() {
        let mut controller = spawned_controller();
        controller.set_evaluation_rate(100).unwrap();
        controller.set_evaluation_seed(7).unwrap();
        controller.set_evaluation_frame(0).unwrap();

        let history = SnapshotBuffer::new(4);
        controller.interpolate(&history, 1.0).unwrap();

        assert_eq!(controller.graph().evaluations(), 1);
    }

    #[test]
    fn authority_snapshot_reaches_proxy() {
        let mut authority = spawned_controller();
        let mut proxy = Controller::new(&sample_desc(), DebugGraph::new()).unwrap();
        proxy.spawned(Authority::PROXY).unwrap();

        let idle = authority.find_state_named("idle").unwrap();
        authority.activate(idle, 0.5);
        for tick in 1..=10 {
            step(&mut authority, tick, 0.05);
        }

        let mut snapshot = Snapshot::new(10, authority.word_count());
        authority.write(&mut snapshot.words).unwrap();

        proxy.begin_ticks(true, Some(&snapshot.words)).unwrap();
        proxy.end_ticks().unwrap();

        let proxy_idle = proxy.find_state_named("idle").unwrap();
        assert_eq!(proxy.tree().node(proxy_idle).fade.weight, 1.0);
    }

    #[test]
    fn despawn_then_respawn_resets_session_state() {
        let mut controller = spawned_controller();
        let idle = controller.find_state_named("idle").unwrap();
        controller.activate(idle, 0.0);
        step(&mut controller, 1, 1.0 / 60.0);

        controller.despawned();
        assert!(!controller.is_spawned());
        assert_eq!(controller.tree().node(idle).fade.weight, 0.0);

        controller.spawned(Authority::STATE).unwrap();
        assert!(controller.is_spawned());
        assert_eq!(controller.tree().node(idle).fade.weight, 0.0);
    }

    struct PortlessGraph;

    impl PoseGraph for PortlessGraph {
        fn create_mixer(&mut self) -> MixerId {
            0
        }
        fn destroy_mixer(&mut self, _mixer: MixerId) {}
        fn create_source(&mut self, _name: &str) -> SourceId {
            0
        }
        fn destroy_source(&mut self, _source: SourceId) {}
        fn set_source_time(&mut self, _source: SourceId, _time: f32) {}
        fn connect(&mut self, _mixer: MixerId, _input: GraphInput, _weight: f32) -> Option<Port> {
            None
        }
        fn set_input_weight(&mut self, _mixer: MixerId, _port: Port, _weight: f32) {}
        fn input_weight(&self, _mixer: MixerId, _port: Port) -> f32 {
            0.0
        }
        fn set_additive(&mut self, _mixer: MixerId, _port: Port, _additive: bool) {}
        fn set_mask(&mut self, _mixer: MixerId, _port: Port, _mask: &LayerMask) {}
        fn evaluate(&mut self) {}
    }

    #[test]
    fn missing_port_is_a_fatal_spawn_error() {
        let mut controller = Controller::new(&sample_desc(), PortlessGraph).unwrap();
        assert!(matches!(
            controller.spawned(Authority::STATE),
            Err(ControllerError::PortUnavailable)
        ));
        assert!(!controller.is_spawned());
    }
}
