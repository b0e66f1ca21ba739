use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use instant::Instant;
use tokio::task::{spawn_local, LocalSet};
use trail_core::sandbox::{Latency, SandboxHost};
use trail_core::{
    node_name, spawn_rebuild_timer, ControllerConfig, ControllerHandle, DelayBinding, PoolController,
    Tuning,
};

mod motion;
mod script;

use motion::HeadMotion;
use script::{demo_script, Cue};

const MATERIAL_COUNT: usize = 4;
const FRAME: Duration = Duration::from_millis(16);
const REPORT_EVERY_MS: f64 = 1_000.0;
const DEFAULT_RUN_SECS: u64 = 10;
const SEED: u64 = 42;

struct Settings {
    config: ControllerConfig,
    run_for: Duration,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        let mut config = ControllerConfig::default();
        if let Ok(v) = std::env::var("FACETRAIL_POOL_SIZE") {
            config.pool_size = v.parse().context("FACETRAIL_POOL_SIZE")?;
        }
        if let Ok(v) = std::env::var("FACETRAIL_BINDING") {
            config.delay_binding = DelayBinding::parse(&v)
                .ok_or_else(|| anyhow::anyhow!("FACETRAIL_BINDING must be `named` or `baked`, got `{v}`"))?;
        }
        let run_secs = match std::env::var("FACETRAIL_RUN_SECS") {
            Ok(v) => v.parse().context("FACETRAIL_RUN_SECS")?,
            Err(_) => DEFAULT_RUN_SECS,
        };
        Ok(Self {
            config,
            run_for: Duration::from_secs(run_secs),
        })
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let settings = Settings::from_env()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    LocalSet::new().block_on(&runtime, run(settings))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let host = Rc::new(
        SandboxHost::with_reference_scene(MATERIAL_COUNT, SEED).with_latency(Latency {
            create_ms: 3,
            destroy_ms: 8,
            attach_ms: 1,
            jitter_ms: 6,
        }),
    );
    log::info!(
        "[native] pool={} binding={:?} period={:?} run={:?}",
        settings.config.pool_size,
        settings.config.delay_binding,
        settings.config.rebuild_period,
        settings.run_for
    );

    let (controller, handle) = PoolController::start(Rc::clone(&host), &settings.config, Tuning::default()).await?;
    let runner = spawn_local(controller.run());
    let timer = spawn_rebuild_timer(handle.clone(), settings.config.rebuild_period);
    let gestures = spawn_local(play_script(handle.clone(), demo_script()));

    let mut motion = HeadMotion::new(SEED);
    let mut frames = tokio::time::interval(FRAME);
    let start = Instant::now();
    let mut next_report = REPORT_EVERY_MS;
    while start.elapsed() < settings.run_for {
        frames.tick().await;
        let t_ms = start.elapsed().as_secs_f64() * 1_000.0;
        host.push_transform(t_ms, motion.sample((t_ms / 1_000.0) as f32));
        host.advance(t_ms);
        if t_ms >= next_report {
            next_report += REPORT_EVERY_MS;
            report(&host, settings.config.pool_size, t_ms);
        }
    }

    gestures.abort();
    timer.abort();
    let snap = handle.snapshot().await?;
    log::info!(
        "[native] generation={:?} rebuilds={} delay_base={:.3}",
        snap.generation,
        snap.rebuilds,
        snap.tuning.delay_base
    );
    handle.shutdown();
    runner.await?;
    Ok(())
}

async fn play_script(handle: ControllerHandle, cues: Vec<Cue>) {
    let start = tokio::time::Instant::now();
    for cue in cues {
        tokio::time::sleep_until(start + Duration::from_millis(cue.at_ms)).await;
        if !handle.gesture(cue.event) {
            log::warn!("[native] {:?} {:?} dropped", cue.event.kind, cue.event.state);
        }
    }
}

fn report(host: &SandboxHost, pool_size: usize, t_ms: f64) {
    let lead = host.find_live(&node_name(0)).and_then(|id| host.transform_of(id));
    let tail = host
        .find_live(&node_name(pool_size.saturating_sub(1)))
        .and_then(|id| host.transform_of(id));
    match (lead, tail) {
        (Some(lead), Some(tail)) => log::info!(
            "[native] t={:.0}ms lead=({:.3},{:.3},{:.3}) tail=({:.3},{:.3},{:.3})",
            t_ms,
            lead.position.x,
            lead.position.y,
            lead.position.z,
            tail.position.x,
            tail.position.y,
            tail.position.z
        ),
        _ => log::info!("[native] t={:.0}ms pool not live", t_ms),
    }
}
