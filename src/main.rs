use anyhow::{ensure, Result};
use clap::Parser;
use log::info;

use logistics_sim::simulation::{DemoConfig, HaulerSpec, SimWorld, TickOutcome};

#[derive(Parser)]
#[command(name = "logistics_sim")]
#[command(about = "Headless construction logistics simulation")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "1000")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f32,

    /// Seed for a reproducible world layout
    #[arg(long)]
    seed: Option<u64>,

    /// Number of haulers to spawn
    #[arg(long, default_value = "6")]
    haulers: usize,

    /// Number of construction sites
    #[arg(long, default_value = "4")]
    sites: usize,

    /// Number of storehouses
    #[arg(long, default_value = "2")]
    storehouses: usize,

    /// Hauler carry capacity in units
    #[arg(long, default_value = "20")]
    capacity: u32,

    /// Hauler speed in world units per second
    #[arg(long, default_value = "4.0")]
    speed: f32,

    /// Pause the clock when this tick is reached
    #[arg(long)]
    pause_at: Option<u32>,

    /// How many loop iterations the pause lasts
    #[arg(long, default_value = "10")]
    pause_for: u32,

    /// Print a report every N ticks (defaults to one simulated second)
    #[arg(long)]
    report_every: Option<u32>,

    /// Sleep between reports so the map can be watched
    #[arg(long)]
    realtime: bool,

    /// Skip the ASCII map in reports
    #[arg(long)]
    no_map: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,logistics_sim=info"),
    )
    .init();

    let cli = Cli::parse();
    ensure!(cli.delta > 0.0, "--delta must be positive");
    ensure!(cli.capacity > 0, "--capacity must be positive");

    run_headless(&cli);
    Ok(())
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(cli: &Cli) {
    println!("Running logistics simulation in headless mode...");
    println!("Ticks: {}, Delta: {}s", cli.ticks, cli.delta);

    // Calculate how many ticks equal 1 second of simulation time
    let ticks_per_second = (1.0 / cli.delta).ceil() as u32;
    let report_every = cli.report_every.unwrap_or(ticks_per_second).max(1);
    println!("Reporting every {} ticks", report_every);
    println!();

    let config = DemoConfig {
        seed: cli.seed,
        delta_secs: cli.delta,
        sites: cli.sites,
        storehouses: cli.storehouses,
        haulers: cli.haulers,
        hauler_spec: HaulerSpec {
            carry_capacity: cli.capacity,
            move_speed: cli.speed,
            ..HaulerSpec::default()
        },
    };
    let mut world = SimWorld::create_demo_world(config);

    println!("Initial state:");
    report(&world, cli);

    let mut ran = 0;
    let mut paused_for = 0;
    while ran < cli.ticks {
        if cli.pause_at == Some(ran) && paused_for < cli.pause_for {
            world.clock.set_paused(true);
            paused_for += 1;
        } else if world.clock.is_paused() {
            world.clock.set_paused(false);
            info!("Clock resumed after {} paused iterations", paused_for);
        }

        match world.tick() {
            TickOutcome::Ran(_) => ran += 1,
            TickOutcome::Skipped => continue,
        }

        if ran % report_every == 0 {
            println!(
                "--- After tick {} ({:.1}s simulated time) ---",
                ran,
                ran as f32 * cli.delta
            );
            report(&world, cli);

            if cli.realtime && ran < cli.ticks {
                std::thread::sleep(std::time::Duration::from_millis(500));
            }
        }
    }

    println!("=== Final State ===");
    report(&world, cli);
}

fn report(world: &SimWorld, cli: &Cli) {
    world.print_summary();
    if !cli.no_map {
        world.draw_map();
    }
    println!();
}
