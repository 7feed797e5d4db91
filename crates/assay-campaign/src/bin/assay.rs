use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use assay_campaign::{Campaign, TracingReporter};
use assay_types::{Row, Table};

#[derive(Parser, Debug)]
#[command(name = "assay", about = "Design-of-experiments campaign manager")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a campaign configuration without creating a campaign.
    Validate(ValidateArgs),
    /// Create a campaign from a configuration and write its state file.
    Init(InitArgs),
    /// Recommend the next batch of experiments.
    Recommend(RecommendArgs),
    /// Add measured experiments to the campaign.
    Add(AddArgs),
    /// Include or exclude discrete candidates.
    Toggle(ToggleArgs),
    /// Print a campaign summary.
    Show(ShowArgs),
}

#[derive(ClapArgs, Debug)]
struct ValidateArgs {
    /// JSON campaign configuration.
    #[arg(long)]
    config: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct InitArgs {
    /// JSON campaign configuration.
    #[arg(long)]
    config: PathBuf,
    /// Campaign state file to create.
    #[arg(long)]
    state: PathBuf,
    /// Overwrite an existing state file.
    #[arg(long)]
    force: bool,
}

#[derive(ClapArgs, Debug)]
struct RecommendArgs {
    #[arg(long)]
    state: PathBuf,
    #[arg(long, default_value_t = 1)]
    batch_size: usize,
    /// JSON records of experiments that are planned but not yet measured.
    #[arg(long)]
    pending: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct AddArgs {
    #[arg(long)]
    state: PathBuf,
    /// JSON records with parameter and target values.
    #[arg(long)]
    data: PathBuf,
    /// Match numerical values exactly instead of within tolerance.
    #[arg(long)]
    no_tolerance: bool,
}

#[derive(ClapArgs, Debug)]
struct ToggleArgs {
    #[arg(long)]
    state: PathBuf,
    /// JSON records over discrete parameter columns.
    #[arg(long)]
    filter: PathBuf,
    #[arg(long, conflicts_with = "include", required_unless_present = "include")]
    exclude: bool,
    #[arg(long)]
    include: bool,
    /// Act on the rows that do not match the filter.
    #[arg(long)]
    anti: bool,
    /// Show the affected rows without changing the campaign.
    #[arg(long)]
    dry_run: bool,
}

#[derive(ClapArgs, Debug)]
struct ShowArgs {
    #[arg(long)]
    state: PathBuf,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate(args) => run_validate(&args),
        Command::Init(args) => run_init(&args),
        Command::Recommend(args) => run_recommend(&args),
        Command::Add(args) => run_add(&args),
        Command::Toggle(args) => run_toggle(&args),
        Command::Show(args) => run_show(&args),
    }
}

fn run_validate(args: &ValidateArgs) -> Result<()> {
    let config = read(&args.config)?;
    Campaign::validate_config(&config)
        .with_context(|| format!("invalid config {}", args.config.display()))?;
    println!("{} is valid", args.config.display());
    Ok(())
}

fn run_init(args: &InitArgs) -> Result<()> {
    if args.state.exists() && !args.force {
        bail!("{} already exists; pass --force to overwrite", args.state.display());
    }
    let campaign = Campaign::from_config(&read(&args.config)?)?;
    campaign.save(&args.state)?;
    info!(state = %args.state.display(), "initialized campaign");
    println!("{campaign}");
    Ok(())
}

fn run_recommend(args: &RecommendArgs) -> Result<()> {
    let mut campaign = load(&args.state)?;
    let pending = args.pending.as_deref().map(read_table).transpose()?;
    let batch = campaign.recommend(args.batch_size, pending.as_ref())?;
    campaign.save(&args.state)?;
    print_table(&batch)
}

fn run_add(args: &AddArgs) -> Result<()> {
    let mut campaign = load(&args.state)?;
    let data = read_table(&args.data)?;
    campaign.add_measurements(&data, !args.no_tolerance)?;
    campaign.save(&args.state)?;
    println!("{campaign}");
    Ok(())
}

fn run_toggle(args: &ToggleArgs) -> Result<()> {
    let mut campaign = load(&args.state)?;
    let filter = read_table(&args.filter)?;
    let affected =
        campaign.toggle_discrete_candidates(&filter, args.exclude, args.anti, args.dry_run)?;
    if !args.dry_run {
        campaign.save(&args.state)?;
    }
    print_table(&affected)
}

fn run_show(args: &ShowArgs) -> Result<()> {
    let campaign = load(&args.state)?;
    println!("{campaign}");
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_table(path: &Path) -> Result<Table> {
    let records: Vec<Row> = serde_json::from_str(&read(path)?)
        .with_context(|| format!("{} is not a JSON array of records", path.display()))?;
    Ok(Table::from_records(&records))
}

fn load(path: &Path) -> Result<Campaign> {
    let campaign: Campaign = Campaign::load(path)
        .with_context(|| format!("failed to load campaign from {}", path.display()))?;
    Ok(campaign.with_reporter(Arc::new(TracingReporter)))
}

fn print_table(table: &Table) -> Result<()> {
    let out = json!({
        "index": table.index(),
        "records": table.to_records(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
