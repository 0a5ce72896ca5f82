use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use deepclean_bench::cleaners;
use deepclean_bench::fixtures::{self, DirSource, GenerateConfig, GeneratedSource};
use deepclean_bench::harness::{HarnessConfig, Profile};
use deepclean_bench::memory::{MemorySampler, ProcessSampler, TrackingAllocator};
use deepclean_bench::schema::RunMeta;
use deepclean_bench::sink::{JsonReportSink, TableSink};
use deepclean_bench::{CleanerVariant, FixtureSource, ReportSink, Session};
use serde_json::Value;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReclaimArg {
    /// Use the hint when the platform supports it.
    Auto,
    On,
    Off,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Format {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Benchmark cleaners over every fixture.
    Run {
        /// Directory of `*.json` fixtures. Generated fixtures are used if omitted.
        #[arg(long, value_name = "DIR")]
        fixtures: Option<PathBuf>,

        /// Size multiplier for generated fixtures.
        #[arg(long, default_value_t = 1)]
        scale: usize,

        /// Which cleaner(s) to benchmark.
        #[arg(long, value_enum, default_value_t = CleanerVariant::All)]
        contender: CleanerVariant,

        /// Warmup iterations per contender and fixture (overrides profile).
        #[arg(long)]
        warmup: Option<u64>,

        /// Measured iterations per contender and fixture (overrides profile).
        #[arg(long)]
        iterations: Option<u64>,

        #[arg(long, value_enum)]
        reclaim: Option<ReclaimArg>,

        /// Measured iterations between forced reclaims.
        #[arg(long)]
        reclaim_cadence: Option<u64>,

        /// Skip memory snapshots entirely.
        #[arg(long, default_value_t = false)]
        no_memory: bool,

        /// Also time the fixture clone alone for in-place cleaners.
        #[arg(long, default_value_t = false)]
        baseline_clone: bool,

        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// List fixtures and registered cleaners.
    List {
        #[arg(long, value_name = "DIR")]
        fixtures: Option<PathBuf>,
    },

    /// Write the generated fixtures to a directory as JSON files.
    GenerateFixtures {
        #[arg(long, short = 'o', value_name = "DIR")]
        output: PathBuf,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 1)]
        scale: usize,
    },
}

#[derive(Parser, Debug)]
#[command(name = "deepclean-bench")]
#[command(about = "Fair micro-benchmark harness for deep-object cleaners")]
struct Args {
    /// Iteration profile [default: quick]. Overrides the config file's `profile`.
    #[arg(long, value_enum, global = true)]
    profile: Option<ProfileArg>,

    /// Seed for contender ordering. Random when omitted.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// JSON config file; command-line flags take precedence.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Where to write the report (JSON or table). If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    // Best-effort: read from environment set by CI/build scripts.
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn fixture_source(dir: Option<PathBuf>, scale: usize) -> Box<dyn FixtureSource<Value>> {
    match dir {
        Some(dir) => Box::new(DirSource { dir }),
        None => Box::new(GeneratedSource {
            config: GenerateConfig { seed: 42, scale },
        }),
    }
}

fn write_output(out: Option<&PathBuf>, text: &str) -> io::Result<()> {
    match out {
        Some(path) => fs::write(path, text),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<HarnessConfig> {
    let profile = args.profile.map(Profile::from);
    let mut cfg = match &args.config {
        Some(path) => HarnessConfig::from_json_file(path, profile)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HarnessConfig::for_profile(profile.unwrap_or_default()),
    };
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }
    Ok(cfg)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut cfg = load_config(&args)?;

    match args.cmd {
        Command::Run {
            fixtures: fixture_dir,
            scale,
            contender,
            warmup,
            iterations,
            reclaim,
            reclaim_cadence,
            no_memory,
            baseline_clone,
            format,
        } => {
            if let Some(w) = warmup {
                cfg.warmup_iterations = w;
            }
            if let Some(n) = iterations {
                cfg.measured_iterations = n;
            }
            if let Some(r) = reclaim {
                cfg.reclaim_hint = match r {
                    ReclaimArg::Auto => None,
                    ReclaimArg::On => Some(true),
                    ReclaimArg::Off => Some(false),
                };
            }
            if let Some(c) = reclaim_cadence {
                cfg.reclaim_cadence = c;
            }
            cfg.track_memory &= !no_memory;
            cfg.baseline_clone |= baseline_clone;

            let session = Session::new(cfg).context("invalid harness configuration")?;
            let mut sampler = ProcessSampler::detect();
            let rcfg = session.runner_config(&sampler);

            let source = fixture_source(fixture_dir, scale);
            let loaded = source.fixtures().context("loading fixtures")?;
            let meta = RunMeta {
                schema_version: 1,
                bench_version: env!("CARGO_PKG_VERSION").to_string(),
                profile: session.config().profile.as_str().to_string(),
                seed: session.seed(),
                warmup_iters: rcfg.warmup_iters,
                iters: rcfg.iters,
                reclaim_support: sampler.reclaim_support(),
                reclaim_enabled: rcfg.reclaim,
                heap_tracking: sampler.heap_tracking(),
                timestamp_utc: now_utc(),
                git_sha: git_sha_short(),
            };
            let registry = || cleaners::registry(contender);

            match format {
                Format::Json => {
                    let mut sink = JsonReportSink::new(loaded.iter().map(fixtures::fingerprint).collect());
                    sink.on_start(&meta);
                    session.run(&loaded, &registry, &mut sampler, &mut sink)?;
                    write_output(args.out.as_ref(), &sink.to_json()?)?;
                }
                Format::Table => {
                    let out: Box<dyn Write> = match &args.out {
                        Some(path) => Box::new(
                            fs::File::create(path)
                                .with_context(|| format!("creating {}", path.display()))?,
                        ),
                        None => Box::new(io::stdout()),
                    };
                    let mut sink = TableSink::new(out);
                    sink.on_start(&meta);
                    session.run(&loaded, &registry, &mut sampler, &mut sink)?;
                    sink.into_inner().flush()?;
                }
            }
        }
        Command::List {
            fixtures: fixture_dir,
        } => {
            let loaded = fixture_source(fixture_dir, 1).fixtures()?;
            let infos: Vec<_> = loaded.iter().map(fixtures::fingerprint).collect();
            let names: Vec<String> = cleaners::registry(CleanerVariant::All)
                .iter()
                .map(|c| format!("{}{}", c.name(), if c.mutates_input() { " (mutates input)" } else { "" }))
                .collect();
            let listing = serde_json::json!({ "fixtures": infos, "contenders": names });
            write_output(args.out.as_ref(), &serde_json::to_string_pretty(&listing)?)?;
        }
        Command::GenerateFixtures { output, seed, scale } => {
            let generated = fixtures::generate_fixtures(&GenerateConfig { seed, scale });
            let paths = fixtures::write_fixtures(&output, &generated)?;
            eprintln!("Wrote {} fixtures to {}", paths.len(), output.display());
            for (f, p) in generated.iter().zip(&paths) {
                let info = fixtures::fingerprint(f);
                eprintln!("  {:<8} {:>10} bytes  {}", info.id, info.bytes, p.display());
            }
        }
    }

    Ok(())
}
