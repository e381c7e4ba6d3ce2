//! Vivarium world runner.
//!
//! Usage: `vivarium [--config vivarium.toml] [--seed]`
//!
//! `--seed` populates an empty world with a handful of demo inhabitants
//! so a fresh database has something to simulate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use vivarium_core::VivariumConfig;
use vivarium_core::affect::{AffectAnalyzer, LexicalAffect};
use vivarium_core::embedding::{CachedEmbeddingProvider, HashedEmbeddingProvider};
use vivarium_core::oracle::BehaviorOracle;
use vivarium_core::persistence::PersistenceGateway;
use vivarium_core::types::{AgentKind, Point, PointId};
use vivarium_core::zones;

use vivarium_llm::affect::OracleAffect;
use vivarium_llm::{OracleClient, OracleService};

use vivarium_engine::broadcast::{AgentView, Broadcaster, WorldUpdate};
use vivarium_engine::context::WorldContext;
use vivarium_engine::motion::{MotionController, MotionLoop};
use vivarium_engine::scheduler::TickScheduler;

const DEMO_AGENTS: &[(&str, &str)] = &[
    ("Mira", "observant and practical, keeps track of details, a touch ironic"),
    ("Dorian", "disciplined and direct, argues when he disagrees, no pathos"),
    ("Lyra", "emotional and lively, social, says what she feels"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let (config_path, seed) = parse_args();
    let config = match &config_path {
        Some(path) => VivariumConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => VivariumConfig::default(),
    };

    let gateway = Arc::new(
        PersistenceGateway::open(&config.persistence.path, &config.persistence)
            .context("opening the world database")?,
    );

    let broadcaster = Broadcaster::new();
    let oracle_service = OracleService::spawn(OracleClient::from_config(&config.oracle), &config.oracle);
    let oracle: Arc<dyn BehaviorOracle> = Arc::new(oracle_service.handle());
    let affect: Arc<dyn AffectAnalyzer> = if config.oracle.oracle_affect && oracle.is_enabled() {
        Arc::new(OracleAffect::new(Arc::clone(&oracle)))
    } else {
        Arc::new(LexicalAffect)
    };
    let embedder = Arc::new(CachedEmbeddingProvider::new(
        HashedEmbeddingProvider::new(config.retrieval.embedding_dimensions),
        config.retrieval.embedding_cache_capacity,
    ));

    let ctx = WorldContext::new(
        config,
        Arc::clone(&gateway),
        oracle,
        affect,
        embedder,
        broadcaster.clone(),
    );

    if seed {
        seed_world(&ctx)?;
    }

    // Log world updates so a headless run is observable.
    let (_observer, mut updates) = broadcaster.subscribe();
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            match &update {
                WorldUpdate::Dialogue {
                    initiator_name,
                    target_name,
                    messages,
                    ..
                } => {
                    info!("{initiator_name} ↔ {target_name}");
                    for line in messages {
                        info!("  {}: {}", line.speaker, line.text);
                    }
                }
                WorldUpdate::AgentThought { thought, .. } => info!(thought = %thought, "agent thought"),
                other => debug!(?other, "world update"),
            }
        }
    });

    let motion = MotionController::new(
        Arc::clone(&gateway),
        ctx.config.motion.clone(),
        broadcaster.clone(),
    );
    let motion_loop = MotionLoop::spawn(motion.clone());

    let scheduler = TickScheduler::new(Arc::clone(&ctx), motion);
    scheduler.start();

    info!("world is running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;

    info!("shutting down");
    scheduler.stop().await;
    motion_loop.stop().await;
    oracle_service.shutdown().await;
    Ok(())
}

/// Minimal argument parsing: `--config <path>` and `--seed`.
fn parse_args() -> (Option<PathBuf>, bool) {
    let mut config = None;
    let mut seed = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = args.next().map(PathBuf::from),
            "--seed" => seed = true,
            other => eprintln!("ignoring unknown argument: {other}"),
        }
    }
    (config, seed)
}

/// Populate an empty world with the demo inhabitants, one per primary
/// zone.
fn seed_world(ctx: &WorldContext) -> anyhow::Result<()> {
    if !ctx.gateway.list_agents()?.is_empty() {
        info!("world already populated, skipping seed");
        return Ok(());
    }

    let mut rng = rand::thread_rng();
    for (i, (name, personality)) in DEMO_AGENTS.iter().enumerate() {
        let zone = zones::zone_by_name(zones::PRIMARY_ZONE_NAMES[i % zones::PRIMARY_ZONE_NAMES.len()])
            .context("primary zone table is never empty")?;
        let (x, y) = zone.random_interior_point(&mut rng);
        let (tx, ty) = zone.random_interior_point(&mut rng);

        let agent = ctx.gateway.insert_agent(name, AgentKind::Agent, personality)?;
        let point = Point {
            id: PointId::new(),
            x,
            y,
            target_x: tx,
            target_y: ty,
            speed: Point::DEFAULT_SPEED,
        };
        ctx.gateway.insert_point(&point)?;
        ctx.gateway.link_point(agent.id, point.id)?;

        let agent = ctx
            .gateway
            .get_agent(agent.id)?
            .context("freshly inserted agent must exist")?;
        ctx.broadcaster.publish(&WorldUpdate::AgentCreated {
            agent: AgentView::from(&agent),
        });
        info!(name, zone = zone.name, "seeded agent");
    }
    Ok(())
}
