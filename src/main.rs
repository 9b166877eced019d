//! Syzygy Lockstep Demo
//!
//! Runs a three-peer session over the in-process mesh: P0 authors the world
//! from a seed, every peer runs its own pump on a tokio task, each fires one
//! projectile once running, and the final world hashes are compared.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use syzygy::{
    TICK_RATE, VERSION,
    core::{hash::StateHash, rng::derive_generation_seed},
    game::{
        command::{CommandAction, FireProjectile},
        generator::{generate_instructions, GenerationConfig},
        world::{Body, Economy, ParticipantId, Projectile, World},
    },
    network::{LocalNetwork, LocalTransport, Session, SessionConfig, SessionEvent, Transport},
    FixedVec2,
};

/// Session id the demo peers agree on.
const SESSION_ID: u64 = 0x5EED;

/// Ticks a peer may spend before giving up.
const MAX_TICKS: u32 = 10 * TICK_RATE;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (RUST_LOG overrides the default level)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Syzygy session core v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    demo_session().await
}

/// What one peer ends with.
struct PeerReport {
    id: ParticipantId,
    hash: StateHash,
    world: World,
    // Held so the endpoint stays in the mesh until every peer is done
    _session: Session<LocalTransport>,
}

#[derive(Serialize)]
struct WorldSummary<'a> {
    bodies: Vec<&'a Body>,
    economies: Vec<&'a Economy>,
    projectiles: Vec<&'a Projectile>,
}

async fn demo_session() -> anyhow::Result<()> {
    info!("=== Starting Demo Session ===");

    let ids: Vec<ParticipantId> = (0..3).map(ParticipantId).collect();
    let roster: BTreeSet<ParticipantId> = ids.iter().copied().collect();
    let roster_bytes: Vec<u8> = roster.iter().map(|p| p.0).collect();

    let seed = derive_generation_seed(SESSION_ID, &roster_bytes);
    let instructions = generate_instructions(seed, &roster, &GenerationConfig::default());
    info!("Session {:#x}: seed {}, {} instructions", SESSION_ID, seed, instructions.len());

    let author = ids[0];
    let mut instructions = Some(instructions);
    let mut handles = Vec::new();
    for transport in LocalNetwork::mesh(&ids) {
        let id = transport.local_id();
        let config = match instructions.take() {
            Some(list) => SessionConfig::author(SESSION_ID, id, roster.clone(), list),
            None => SessionConfig::follower(SESSION_ID, id, roster.clone(), author),
        };
        let (session, events) = Session::new(config, transport);
        handles.push(tokio::spawn(run_peer(session, events)));
    }

    let mut reports = Vec::new();
    for handle in handles {
        reports.push(handle.await.context("peer task panicked")??);
    }

    info!("=== Session Results ===");
    for report in &reports {
        info!("{}: world hash {}", report.id, hex::encode(report.hash));
    }

    let first = &reports[0];
    if let Some(odd) = reports.iter().find(|r| r.hash != first.hash) {
        bail!("DESYNC: {} and {} disagree on the world", first.id, odd.id);
    }
    info!("All {} peers agree ({} projectiles in flight)", reports.len(), first.world.projectiles.len());

    let summary = WorldSummary {
        bodies: first.world.bodies.values().collect(),
        economies: first.world.economies.values().collect(),
        projectiles: first.world.projectiles.values().collect(),
    };
    debug!("Final world:\n{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

/// Drive one peer: pump every tick, fire once running, stop when every
/// peer's shot has been applied locally.
async fn run_peer(
    mut session: Session<LocalTransport>,
    mut events: UnboundedReceiver<SessionEvent>,
) -> anyhow::Result<PeerReport> {
    let id = session.local_id();
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / TICK_RATE as u64));
    let mut fired = false;

    session.start().with_context(|| format!("{} could not start", id))?;

    for _ in 0..MAX_TICKS {
        interval.tick().await;
        session.pump();

        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::Aborted(reason) => bail!("{} aborted: {}", id, reason),
                SessionEvent::Desync { from, rejection } => {
                    warn!("{} desynced with {}: {}", id, from, rejection);
                }
                other => debug!("{} event: {:?}", id, other),
            }
        }

        let Some(world) = session.world() else {
            continue;
        };

        if !fired {
            let Some(home) = world.economy(id).and_then(|e| world.body(e.body)) else {
                bail!("{} has no home body", id);
            };
            // Aim at the star
            let aim = if home.position.is_zero() { FixedVec2::RIGHT } else { -home.position };
            let action = CommandAction::FireProjectile(FireProjectile { body: home.id, aim });
            fired = session.submit(action);
            info!("{} fired: {}", id, fired);
            continue;
        }

        if world.projectiles.len() == world.participants.len() {
            let world = world.clone();
            return Ok(PeerReport {
                id,
                hash: world.compute_hash(),
                world,
                _session: session,
            });
        }
    }

    bail!("{} did not finish within {} ticks", id, MAX_TICKS)
}
