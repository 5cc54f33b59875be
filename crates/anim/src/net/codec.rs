use crate::state::StateKind;
use crate::tree::{AnimationTree, NodeId, NodeKind};

use super::interpolate::{interpolate_time, interpolate_weight};

bitflags::bitflags! {
    /// Coarse authority bookkeeping carried in the controller codec entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControllerFlags: u32 {
        const INPUT_AUTHORITY = 1 << 0;
        const STATE_AUTHORITY = 1 << 1;
    }
}

/// Controller-level replicated fields, serialized by the first codec entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicatedStatus {
    pub tick: u32,
    pub flags: ControllerFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodecTarget {
    Controller,
    Node(NodeId),
}

/// One unit of the wire image: a target plus its fixed word span. Offsets are
/// computed once at build time; identical tree shapes therefore produce
/// identical layouts on every peer, which is the wire-compatibility contract.
#[derive(Debug)]
struct CodecEntry {
    target: CodecTarget,
    offset: usize,
    words: usize,
}

#[derive(Debug)]
pub struct CodecTable {
    entries: Vec<CodecEntry>,
    word_count: usize,
}

impl CodecTable {
    /// Walks the tree once, depth-first in declaration order, letting every
    /// node claim its span. The controller entry always comes first.
    pub fn build(tree: &AnimationTree) -> Self {
        let mut entries = Vec::with_capacity(tree.len() + 1);
        let mut offset = 0;

        let mut push = |target: CodecTarget, words: usize, offset: &mut usize| {
            entries.push(CodecEntry {
                target,
                offset: *offset,
                words,
            });
            *offset += words;
        };

        push(CodecTarget::Controller, 2, &mut offset);

        for id in tree.replication_order() {
            let words = match &tree.node(id).kind {
                NodeKind::Layer(_) => 2,
                NodeKind::State(kind) => 2 + kind.extra_word_count(),
            };
            push(CodecTarget::Node(id), words, &mut offset);
        }

        Self {
            entries,
            word_count: offset,
        }
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Applies an authoritative snapshot to the live fixed-step state. Used
    /// when entering resimulation on a remote copy.
    pub fn read(&self, tree: &mut AnimationTree, status: &mut ReplicatedStatus, words: &[u32]) {
        for entry in &self.entries {
            let span = &words[entry.offset..entry.offset + entry.words];
            match entry.target {
                CodecTarget::Controller => {
                    status.tick = span[0];
                    status.flags = ControllerFlags::from_bits_retain(span[1]);
                }
                CodecTarget::Node(id) => {
                    let node = tree.node_mut(id);
                    node.fade.weight = f32::from_bits(span[0]);
                    node.fade.fading_speed = f32::from_bits(span[1]);

                    if let NodeKind::State(kind) = &mut node.kind {
                        match kind {
                            StateKind::Group => {}
                            StateKind::Clip(clip) => {
                                clip.time = f32::from_bits(span[2]);
                            }
                            StateKind::MultiClip(multi) => {
                                multi.time = f32::from_bits(span[2]);
                                multi.active_clip = span[3] as usize;
                            }
                            StateKind::BlendSpace(blend) => {
                                blend.time = f32::from_bits(span[2]);
                                for (index, weight) in blend.weights.iter_mut().enumerate() {
                                    *weight = f32::from_bits(span[3 + index]);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Serializes the live fixed-step state into the wire image. Authority
    /// only, once per forward tick.
    pub fn write(&self, tree: &AnimationTree, status: &ReplicatedStatus, words: &mut [u32]) {
        for entry in &self.entries {
            let span = &mut words[entry.offset..entry.offset + entry.words];
            match entry.target {
                CodecTarget::Controller => {
                    span[0] = status.tick;
                    span[1] = status.flags.bits();
                }
                CodecTarget::Node(id) => {
                    let node = tree.node(id);
                    span[0] = node.fade.weight.to_bits();
                    span[1] = node.fade.fading_speed.to_bits();

                    if let NodeKind::State(kind) = &node.kind {
                        match kind {
                            StateKind::Group => {}
                            StateKind::Clip(clip) => {
                                span[2] = clip.time.to_bits();
                            }
                            StateKind::MultiClip(multi) => {
                                span[2] = multi.time.to_bits();
                                span[3] = multi.active_clip as u32;
                            }
                            StateKind::BlendSpace(blend) => {
                                span[2] = blend.time.to_bits();
                                for (index, weight) in blend.weights.iter().enumerate() {
                                    span[3 + index] = weight.to_bits();
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Blends two historical snapshots into the render-side fields. Never
    /// touches authoritative state.
    pub fn interpolate(&self, tree: &mut AnimationTree, from: &[u32], to: &[u32], alpha: f32) {
        for entry in &self.entries {
            let from_span = &from[entry.offset..entry.offset + entry.words];
            let to_span = &to[entry.offset..entry.offset + entry.words];

            let CodecTarget::Node(id) = entry.target else {
                continue;
            };

            let from_weight = f32::from_bits(from_span[0]);
            let to_weight = f32::from_bits(to_span[0]);
            let weight = interpolate_weight(from_weight, to_weight, alpha);

            let node = tree.node_mut(id);
            node.fade.interpolated_weight = weight;

            if let NodeKind::State(kind) = &mut node.kind {
                match kind {
                    StateKind::Group => {}
                    StateKind::Clip(clip) => {
                        clip.interpolated_time = interpolate_time(
                            f32::from_bits(from_span[2]),
                            f32::from_bits(to_span[2]),
                            1.0,
                            alpha,
                            weight,
                        );
                    }
                    StateKind::MultiClip(multi) => {
                        multi.interpolated_time = interpolate_time(
                            f32::from_bits(from_span[2]),
                            f32::from_bits(to_span[2]),
                            1.0,
                            alpha,
                            weight,
                        );
                        multi.interpolated_clip = if alpha < 0.5 {
                            from_span[3] as usize
                        } else {
                            to_span[3] as usize
                        };
                    }
                    StateKind::BlendSpace(blend) => {
                        blend.interpolated_time = interpolate_time(
                            f32::from_bits(from_span[2]),
                            f32::from_bits(to_span[2]),
                            1.0,
                            alpha,
                            weight,
                        );
                        for (index, slot) in blend.interpolated_weights.iter_mut().enumerate() {
                            *slot = interpolate_weight(
                                f32::from_bits(from_span[3 + index]),
                                f32::from_bits(to_span[3 + index]),
                                alpha,
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BlendClipDesc, BlendSpaceDesc, ClipDesc};
    use crate::tree::{ControllerDesc, LayerDesc, StateDesc};
    use glam::Vec2;

    fn sample_tree() -> AnimationTree {
        let desc = ControllerDesc {
            layers: vec![
                LayerDesc::new(
                    "locomotion",
                    vec![
                        StateDesc::clip("jump", ClipDesc::new("jump", 0.8, false)),
                        StateDesc::blend_space(
                            "move",
                            BlendSpaceDesc {
                                clips: vec![
                                    BlendClipDesc::new("idle", 1.0, Vec2::ZERO),
                                    BlendClipDesc::new("run", 0.7, Vec2::new(0.0, 2.0)),
                                ],
                                looping: true,
                            },
                        ),
                    ],
                ),
                LayerDesc::new(
                    "upper",
                    vec![StateDesc::multi_clip(
                        "hit",
                        vec![
                            ClipDesc::new("hit_a", 0.4, false),
                            ClipDesc::new("hit_b", 0.4, false),
                        ],
                    )],
                ),
            ],
        };
        AnimationTree::build(&desc).unwrap()
    }

    #[test]
    fn word_count_sums_entry_spans() {
        let tree = sample_tree();
        let codec = CodecTable::build(&tree);

        // controller 2, layers 2 + 2, jump 3, move 2 + 1 + 2, hit 4
        assert_eq!(codec.word_count(), 2 + 2 + 3 + 5 + 2 + 4);
    }

    #[test]
    fn write_read_roundtrip_is_bit_exact() {
        let mut source = sample_tree();
        let codec = CodecTable::build(&source);

        let jump = source.find_state_named("jump").unwrap();
        let hit = source.find_state_named("hit").unwrap();
        let moving = source.find_state_named("move").unwrap();

        source.node_mut(jump).fade.weight = 0.3337;
        source.node_mut(jump).fade.fading_speed = -1.25;
        source.node_mut(jump).clip_mut().unwrap().time = 0.77;
        source.node_mut(hit).multi_clip_mut().unwrap().active_clip = 1;
        source.node_mut(hit).multi_clip_mut().unwrap().time = 0.12;
        let blend = source.node_mut(moving).blend_space_mut().unwrap();
        blend.weights[0] = 0.25;
        blend.weights[1] = 0.75;

        let status = ReplicatedStatus {
            tick: 99,
            flags: ControllerFlags::STATE_AUTHORITY,
        };

        let mut words = vec![0u32; codec.word_count()];
        codec.write(&source, &status, &mut words);

        let mut target = sample_tree();
        let mut target_status = ReplicatedStatus::default();
        codec.read(&mut target, &mut target_status, &words);

        assert_eq!(target_status.tick, 99);
        assert_eq!(target_status.flags, ControllerFlags::STATE_AUTHORITY);

        let mut echoed = vec![0u32; codec.word_count()];
        codec.write(&target, &target_status, &mut echoed);
        assert_eq!(words, echoed);

        let jump = target.find_state_named("jump").unwrap();
        assert_eq!(target.node(jump).fade.weight.to_bits(), 0.3337f32.to_bits());
        let hit = target.find_state_named("hit").unwrap();
        assert_eq!(target.node(hit).multi_clip().unwrap().active_clip, 1);
    }

    #[test]
    fn interpolate_reproduces_endpoints() {
        let mut tree = sample_tree();
        let codec = CodecTable::build(&tree);
        let jump = tree.find_state_named("jump").unwrap();

        let mut from = vec![0u32; codec.word_count()];
        let mut to = vec![0u32; codec.word_count()];

        tree.node_mut(jump).fade.weight = 0.2;
        tree.node_mut(jump).clip_mut().unwrap().time = 0.4;
        codec.write(&tree, &ReplicatedStatus::default(), &mut from);

        tree.node_mut(jump).fade.weight = 0.6;
        tree.node_mut(jump).clip_mut().unwrap().time = 0.5;
        codec.write(&tree, &ReplicatedStatus::default(), &mut to);

        codec.interpolate(&mut tree, &from, &to, 0.0);
        assert_eq!(tree.node(jump).fade.interpolated_weight, 0.2);
        assert_eq!(tree.node(jump).clip().unwrap().interpolated_time, 0.4);

        codec.interpolate(&mut tree, &from, &to, 1.0);
        assert_eq!(tree.node(jump).fade.interpolated_weight, 0.6);
        assert_eq!(tree.node(jump).clip().unwrap().interpolated_time, 0.5);

        codec.interpolate(&mut tree, &from, &to, 0.5);
        assert!((tree.node(jump).fade.interpolated_weight - 0.4).abs() < 1e-6);
    }

    #[test]
    fn interpolate_never_touches_fixed_state() {
        let mut tree = sample_tree();
        let codec = CodecTable::build(&tree);
        let jump = tree.find_state_named("jump").unwrap();

        let mut from = vec![0u32; codec.word_count()];
        let mut to = vec![0u32; codec.word_count()];

        tree.node_mut(jump).fade.weight = 1.0;
        codec.write(&tree, &ReplicatedStatus::default(), &mut from);
        codec.write(&tree, &ReplicatedStatus::default(), &mut to);

        tree.node_mut(jump).fade.weight = 0.123;
        codec.interpolate(&mut tree, &from, &to, 0.5);

        assert_eq!(tree.node(jump).fade.weight, 0.123);
        assert_eq!(tree.node(jump).fade.interpolated_weight, 1.0);
    }

    #[test]
    fn multi_clip_index_steps_at_midpoint() {
        let mut tree = sample_tree();
        let codec = CodecTable::build(&tree);
        let hit = tree.find_state_named("hit").unwrap();

        let mut from = vec![0u32; codec.word_count()];
        let mut to = vec![0u32; codec.word_count()];

        tree.node_mut(hit).fade.weight = 0.5;
        tree.node_mut(hit).multi_clip_mut().unwrap().active_clip = 0;
        codec.write(&tree, &ReplicatedStatus::default(), &mut from);
        tree.node_mut(hit).multi_clip_mut().unwrap().active_clip = 1;
        codec.write(&tree, &ReplicatedStatus::default(), &mut to);

        codec.interpolate(&mut tree, &from, &to, 0.25);
        assert_eq!(tree.node(hit).multi_clip().unwrap().interpolated_clip, 0);

        codec.interpolate(&mut tree, &from, &to, 0.75);
        assert_eq!(tree.node(hit).multi_clip().unwrap().interpolated_clip, 1);
    }
}
