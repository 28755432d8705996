use anyhow::Context;
use clap::Parser;
use generator::scenario::ScenarioKind;
use operator::bridge::operator_bind_address;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use workflow::config::SimulationConfig;
use workflow::profile::{FollowProfile, ProfileSwitch};
use workflow::runner::Runner;

mod generator;
mod operator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Person-following drone scenario driver")]
struct Args {
    /// Load a mission from YAML instead of the bundled sample
    #[arg(long)]
    mission: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ScenarioKind::Walk)]
    scenario: ScenarioKind,
    /// Number of control ticks in an offline run
    #[arg(long, default_value_t = 300)]
    ticks: usize,
    /// Run the scenario on a simulated clock and print a summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Fly the scenario in real time behind the operator HTTP bridge
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value_t = 9000)]
    port: u16,
    /// Restart the mission with a preset follow profile
    #[arg(long, value_enum)]
    profile: Option<FollowProfile>,
    /// Simulated time of the profile restart in an offline run
    #[arg(long, default_value_t = 0.0)]
    profile_at: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.mission {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::sample()?,
    };
    let mut runner = Runner::new(config);
    if let Some(profile) = args.profile {
        runner = runner.with_profile_switch(ProfileSwitch {
            at: args.profile_at,
            profile,
        });
    }

    if args.offline || !args.serve {
        let summary = runner.execute(args.scenario, args.ticks)?;

        println!(
            "Offline run -> {} ticks, final mode {}, range {:.2} m, messages {}",
            summary.ticks,
            summary.final_mode.name(),
            summary.final_range,
            summary.messages_sent
        );
        for (mode, ticks) in &summary.mode_ticks {
            println!("  {:<10} {}", mode, ticks);
        }
        if let Some(at) = summary.restarted_at {
            println!("  mission restarted with new profile at {:.1} s", at);
        }
        for alert in &summary.alerts {
            println!("  alert @ {:.2}: {}", alert.timestamp, alert.message);
        }

        let report = format!(
            "scenario={:?} ticks={} final_mode={} failsafe={:?} modes={:?} metrics={}\n",
            args.scenario,
            summary.ticks,
            summary.final_mode.name(),
            summary.failsafe_cause,
            summary.mode_ticks,
            serde_json::to_string(&summary.metrics)?
        );
        let report_path = PathBuf::from("tools/data/offline_follow.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&report_path)
            .with_context(|| format!("opening {}", report_path.display()))?;
        file.write_all(report.as_bytes())?;
    }
    if args.serve {
        println!("Operator bridge on port {} (Ctrl+C to stop)...", args.port);
        let runtime = TokioBuilder::new_multi_thread()
            .enable_all()
            .build()
            .context("creating runtime for live session")?;
        let ticks = runtime.block_on(runner.serve(args.scenario, operator_bind_address(args.port)))?;
        println!("Live session ended after {} ticks", ticks);
    }

    Ok(())
}
