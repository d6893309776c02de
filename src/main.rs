// ================================
// src/main.rs - replay a driving scenario through the engine
// ================================
use anyhow::{Context, Result};
use serde::Deserialize;
use speed_arbitration::{
    pacer::{arbitrate, SetSpeedPacer},
    EngineConfig, ParamStore, PlanSnapshot, SpeedArbitrationEngine, VehicleState,
};
use std::{
    env, fs,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::time::{interval, Duration};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Fraction of the set-speed error the simulated car closes each tick.
const SPEED_LAG: f64 = 0.02;

#[derive(Deserialize, Debug)]
struct Scenario {
    #[serde(default)]
    engine: EngineConfig,
    cruise_set_speed: f64,
    initial_set_speed: f64,
    #[serde(default = "default_cycle_ms")]
    cycle_ms: u64,
    #[serde(rename = "phase")]
    phases: Vec<Phase>,
}

#[derive(Deserialize, Debug)]
struct Phase {
    name: String,
    cycles: u32,
    /// Curvature-implied safe speed ahead (km/h)
    #[serde(default = "straight_road")]
    curve_speed: f64,
    #[serde(default)]
    vehicle: VehicleState,
    #[serde(default)]
    plan: PlanSnapshot,
}

fn default_cycle_ms() -> u64 {
    10
}

fn straight_road() -> f64 {
    255.0
}

impl Scenario {
    fn load() -> Result<Self> {
        let path = env::var("SCENARIO_PATH")
            .unwrap_or_else(|_| "./demos/cruise_scenario.toml".to_string());
        let scenario_str =
            fs::read_to_string(&path).with_context(|| format!("reading scenario {}", path))?;
        toml::from_str(&scenario_str).with_context(|| format!("parsing scenario {}", path))
    }
}

async fn run(scenario: Scenario, store: ParamStore, running: Arc<AtomicBool>) {
    let mut engine = SpeedArbitrationEngine::new(scenario.engine, store);
    engine.set_cruise_set_speed(scenario.cruise_set_speed);

    let mut pacer = SetSpeedPacer::new();
    let mut displayed = scenario.initial_set_speed;
    let mut ticker = interval(Duration::from_millis(scenario.cycle_ms));

    'phases: for phase in &scenario.phases {
        info!("Phase '{}' ({} cycles)", phase.name, phase.cycles);
        let mut clu = phase.vehicle.clu_vanz;

        for _ in 0..phase.cycles {
            if !running.load(Ordering::SeqCst) {
                info!("Shutdown requested");
                break 'phases;
            }
            ticker.tick().await;

            let vehicle = VehicleState {
                clu_vanz: clu,
                v_set_dis: displayed,
                ..phase.vehicle.clone()
            };

            let lead = engine.update_lead(&vehicle, &phase.plan);
            let curve = engine.update_curve(&vehicle, phase.curve_speed);
            displayed = pacer.advance(displayed, arbitrate(lead, curve));
            clu += (displayed - clu) * SPEED_LAG;

            debug!("{}", engine.diagnostic(&vehicle));
        }

        info!(
            "Phase '{}' done: set speed {:.0} km/h, road speed {:.1} km/h, step {}",
            phase.name,
            displayed,
            clu,
            engine.state().last_decision.code()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("speed_arbitration=info")),
        )
        .init();

    info!("Speed arbitration scenario replay");

    let scenario = Scenario::load()?;
    let store = ParamStore::new().context("opening parameter store")?;
    store.start_file_watcher();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    run(scenario, store, running).await;
    Ok(())
}
