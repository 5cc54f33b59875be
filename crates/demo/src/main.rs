use anyhow::Result;
use glam::Vec2;
use log::info;

use crossfade::{
    Authority, BlendClipDesc, BlendSpaceDesc, ClipDesc, Controller, ControllerDesc, DebugGraph,
    FixedContext, LayerDesc, RenderContext, Snapshot, SnapshotBuffer, StateDesc,
};

const TICK_RATE: u32 = 60;
const RENDER_RATE: u32 = 144;

fn character() -> ControllerDesc {
    ControllerDesc {
        layers: vec![
            LayerDesc::new(
                "locomotion",
                vec![
                    StateDesc::blend_space(
                        "move",
                        BlendSpaceDesc {
                            clips: vec![
                                BlendClipDesc::new("idle", 1.0, Vec2::ZERO),
                                BlendClipDesc::new("walk", 1.2, Vec2::new(0.0, 1.0)),
                                BlendClipDesc::new("run", 0.8, Vec2::new(0.0, 3.0)),
                            ],
                            looping: true,
                        },
                    ),
                    StateDesc::clip("jump", ClipDesc::new("jump", 0.6, false)),
                ],
            ),
            LayerDesc::new(
                "upper_body",
                vec![StateDesc::clip("wave", ClipDesc::new("wave", 1.5, false))],
            ),
        ],
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut server = Controller::new(&character(), DebugGraph::new())?;
    server.spawned(Authority::STATE)?;

    let mut client = Controller::new(&character(), DebugGraph::new())?;
    client.spawned(Authority::PROXY)?;

    info!(
        "replicating {} words per snapshot",
        server.word_count()
    );

    let mut history = SnapshotBuffer::new(32);
    let tick_dt = 1.0 / TICK_RATE as f32;
    let render_dt = 1.0 / RENDER_RATE as f32;

    let moving = server.find_state_named("move").unwrap();
    let jump = server.find_state_named("jump").unwrap();
    let wave = server.find_state_named("wave").unwrap();

    // Scripted authority input: start moving, wave mid-way, jump near the end.
    server.activate(moving, 0.3);

    let mut accumulator = 0.0f32;
    let mut tick = 0u32;

    for frame in 0..240 {
        let t = frame as f32 * render_dt;

        if frame == 60 {
            server.activate(wave, 0.2);
        }
        if frame == 150 {
            server.activate(jump, 0.1);
        }

        if let Some(blend) = server
            .tree_mut()
            .node_mut(moving)
            .blend_space_mut()
        {
            blend.set_position(Vec2::new(0.0, (t * 1.5).min(3.0)));
        }

        // Fixed-rate simulation on the authority, snapshot after each
        // forward tick; the wire bytes go through the rkyv framing the
        // transport would use.
        accumulator += render_dt;
        while accumulator >= tick_dt {
            accumulator -= tick_dt;
            tick += 1;

            server.begin_ticks(false, None)?;
            server.fixed_update(&FixedContext {
                tick,
                delta_time: tick_dt,
                resimulation: false,
            })?;
            server.end_ticks()?;

            let mut snapshot = Snapshot::new(tick, server.word_count());
            server.write(&mut snapshot.words)?;
            let bytes = snapshot.serialize()?;
            history.push(Snapshot::deserialize(&bytes)?);
        }

        // Variable-rate cosmetic update on the remote copy.
        client.set_evaluation_frame(frame)?;
        client.render_update(
            &RenderContext {
                delta_time: render_dt,
                alpha: accumulator / tick_dt,
            },
            &history,
        )?;

        if frame % 24 == 0 {
            let tree = client.tree();
            info!(
                "frame {frame:3} | move {:.3} | jump {:.3} | wave {:.3}",
                tree.node(client.find_state_named("move").unwrap())
                    .fade
                    .interpolated_weight,
                tree.node(client.find_state_named("jump").unwrap())
                    .fade
                    .interpolated_weight,
                tree.node(client.find_state_named("wave").unwrap())
                    .fade
                    .interpolated_weight,
            );
        }
    }

    info!(
        "done: {} ticks simulated, {} client evaluations",
        tick,
        client.graph().evaluations()
    );

    server.despawned();
    client.despawned();

    Ok(())
}
