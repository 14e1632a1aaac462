use clap::Parser;
use maas_analytics::{AnalyticsConfig, MaaSAnalytics, ManualClock, WriterSink};
use std::error::Error;
use std::fs;
use std::io;
use std::path::PathBuf;

mod script;

/// Replays a script of analytics calls against a client driven by a simulated
/// clock and prints every delivered event as one line of JSON.
#[derive(Parser, Debug)]
struct Opt {
    /// Script to replay
    script: PathBuf,

    /// Client configuration (TOML)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Print the client's counters to stderr when done
    #[arg(long = "stats")]
    stats: bool,
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    env_logger::init();

    let opt = Opt::parse();

    let config = match opt.config {
        Some(ref path) => AnalyticsConfig::from_path(path)?,
        None => AnalyticsConfig::default(),
    };

    let source = fs::read_to_string(&opt.script)?;
    let commands = script::parse(&source)?;

    let clock = ManualClock::new();
    let client = MaaSAnalytics::builder()
        .config(config)
        .clock(clock.clone())
        .sink(WriterSink::new(io::stdout()))
        .build()?;

    let mut delivered = script::execute(&client, &clock, &commands)?;
    delivered += client.shutdown()?;

    if opt.stats {
        let stats = client.stats();
        eprintln!("service:             {}", MaaSAnalytics::service_name());
        eprintln!("events delivered:    {}", delivered);
        eprintln!("events recorded:     {}", stats.recorded);
        eprintln!("events evicted:      {}", stats.dropped);
        eprintln!("calls rejected:      {}", stats.rejected);
        eprintln!("timed events open:   {}", stats.active_timed_events);
    }

    Ok(())
}
