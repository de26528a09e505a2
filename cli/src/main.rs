mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    cmd_cycle_average, cmd_cycle_clear_day, cmd_cycle_day_type, cmd_cycle_disable,
    cmd_cycle_enable, cmd_cycle_lock, cmd_cycle_mark, cmd_cycle_set_day, cmd_cycle_show,
    cmd_cycle_start_day, cmd_goal_clear, cmd_goal_set, cmd_goal_show, cmd_import_weights,
    cmd_override_clear, cmd_override_list, cmd_override_set, cmd_redistribute, cmd_target_clear,
    cmd_target_set, cmd_target_show, cmd_target_week, cmd_weight_delete, cmd_weight_history,
    cmd_weight_log, cmd_weight_recompute, cmd_weight_show,
};
use crate::config::Config;
use heft_core::db::Database;
use heft_core::goals::GoalProfile;
use heft_core::models::DayTargets;
use heft_core::service::HeftService;

#[derive(Parser)]
#[command(
    name = "heft",
    version,
    about = "Weight trend and macro target tracker",
    long_about = "\n\n  ██╗  ██╗███████╗███████╗████████╗
  ██║  ██║██╔════╝██╔════╝╚══██╔══╝
  ███████║█████╗  █████╗     ██║
  ██╔══██║██╔══╝  ██╔══╝     ██║
  ██║  ██║███████╗██║        ██║
  ╚═╝  ╚═╝╚══════╝╚═╝        ╚═╝
      the trend, not the noise.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the local HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Weight logging and trend
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Import data from other apps
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },
    /// Resolved daily targets and base targets
    Target {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Weekly macro cycling
    Cycle {
        #[command(subcommand)]
        command: CycleCommands,
    },
    /// Per-date target overrides
    Override {
        #[command(subcommand)]
        command: OverrideCommands,
    },
    /// Body stats and goal used to derive base targets
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Spread the rest of this week's budget over the open days
    Redistribute {
        /// JSON file mapping YYYY-MM-DD to recorded intake
        #[arg(long)]
        intake: Option<PathBuf>,
        /// Reference day (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Show the plan without saving overrides
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Calorie and gram targets for one day.
#[derive(Args)]
struct TargetArgs {
    /// Calories (kcal)
    calories: i64,
    /// Protein (g)
    protein: f64,
    /// Carbs (g)
    carbs: f64,
    /// Fat (g)
    fat: f64,
}

impl TargetArgs {
    fn targets(&self) -> DayTargets {
        DayTargets::new(self.calories, self.protein, self.carbs, self.fat)
    }
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight entry
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Optional notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight for a specific date (default: today)
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history with trend
    History {
        /// Number of most recent entries to show (default: all)
        #[arg(short, long)]
        days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a weight entry by ID
    Delete {
        /// Weight entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute the stored trend
    Recompute {
        /// First date to recompute (default: whole history)
        #[arg(long)]
        from: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ImportCommands {
    /// Import weights from a CSV file with Date and Weight columns
    Weight {
        /// Path to the CSV file
        file: PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Show the resolved targets for a date
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved targets for each day of the cycle week
    Week {
        /// Any date in the week (default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set base targets by hand (takes precedence over the goal profile)
    Set {
        #[command(flatten)]
        targets: TargetArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear manually set base targets
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CycleCommands {
    /// Show the cycling configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Enable cycling
    Enable {
        /// Pattern: training_rest, high_low_carb, even_distribution, custom, redistribution
        #[arg(long)]
        pattern: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Disable cycling
    Disable {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the targets for one weekday
    SetDay {
        /// Day: sunday-saturday, sun-sat, or 0-6
        day: String,
        #[command(flatten)]
        targets: TargetArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the targets for one weekday
    ClearDay {
        /// Day: sunday-saturday, sun-sat, or 0-6
        day: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark training or high-carb days
    Mark {
        /// Days: comma list, weekdays, weekends, all, or none
        days: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lock days so redistribution leaves them alone
    Lock {
        /// Days: comma list, weekdays, weekends, all, or none
        days: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the first day of the cycle week
    StartDay {
        /// Day: sunday-saturday, sun-sat, or 0-6
        day: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Average of the configured per-day targets
    Average {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the day type for a weekday
    DayType {
        /// Day: sunday-saturday, sun-sat, or 0-6
        day: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum OverrideCommands {
    /// Replace the targets for one date
    Set {
        #[command(flatten)]
        targets: TargetArgs,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the override for one date
    Clear {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List overrides
    List {
        /// Only overrides on or after this date
        #[arg(long)]
        from: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Save body stats and goal, and derive base targets from them
    Set {
        /// Sex: male or female
        #[arg(long)]
        sex: String,
        /// Age in years
        #[arg(long)]
        age: u32,
        /// Height in cm
        #[arg(long)]
        height: f64,
        /// Weight in kg
        #[arg(long)]
        weight: f64,
        /// Activity: sedentary, light, moderate, very_active, extra_active
        #[arg(long, default_value = "moderate")]
        activity: String,
        /// Goal: lose, maintain, gain
        #[arg(long, default_value = "maintain")]
        goal: String,
        /// Weekly rate of change in kg
        #[arg(long, default_value = "0.5")]
        rate: f64,
        /// Protein percentage (must sum to 100 with carbs and fat)
        #[arg(long, default_value = "30")]
        protein: i64,
        /// Carbs percentage
        #[arg(long, default_value = "40")]
        carbs: i64,
        /// Fat percentage
        #[arg(long, default_value = "30")]
        fat: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the goal profile and derived targets
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the goal profile
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config);
    let svc = HeftService::from_database(Database::open(&config.db_path)?);

    match cli.command {
        Commands::Serve { port, bind } => server::start_server(svc, port, &bind).await,
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                notes,
                json,
            } => cmd_weight_log(&svc, value, &unit, date, notes, json),
            WeightCommands::Show { date, json } => cmd_weight_show(&svc, date, json),
            WeightCommands::History { days, json } => cmd_weight_history(&svc, days, json),
            WeightCommands::Delete { id, json } => cmd_weight_delete(&svc, id, json),
            WeightCommands::Recompute { from, json } => cmd_weight_recompute(&svc, from, json),
        },
        Commands::Import { command } => match command {
            ImportCommands::Weight {
                file,
                dry_run,
                json,
            } => cmd_import_weights(&svc, &file, dry_run, json),
        },
        Commands::Target { command } => match command {
            TargetCommands::Show { date, json } => cmd_target_show(&svc, date, json),
            TargetCommands::Week { date, json } => cmd_target_week(&svc, date, json),
            TargetCommands::Set { targets, json } => {
                cmd_target_set(&svc, &targets.targets(), json)
            }
            TargetCommands::Clear { json } => cmd_target_clear(&svc, json),
        },
        Commands::Cycle { command } => match command {
            CycleCommands::Show { json } => cmd_cycle_show(&svc, json),
            CycleCommands::Enable { pattern, json } => cmd_cycle_enable(&svc, pattern, json),
            CycleCommands::Disable { json } => cmd_cycle_disable(&svc, json),
            CycleCommands::SetDay { day, targets, json } => {
                cmd_cycle_set_day(&svc, &day, targets.targets(), json)
            }
            CycleCommands::ClearDay { day, json } => cmd_cycle_clear_day(&svc, &day, json),
            CycleCommands::Mark { days, json } => cmd_cycle_mark(&svc, &days, json),
            CycleCommands::Lock { days, json } => cmd_cycle_lock(&svc, &days, json),
            CycleCommands::StartDay { day, json } => cmd_cycle_start_day(&svc, &day, json),
            CycleCommands::Average { json } => cmd_cycle_average(&svc, json),
            CycleCommands::DayType { day, json } => cmd_cycle_day_type(&svc, &day, json),
        },
        Commands::Override { command } => match command {
            OverrideCommands::Set {
                targets,
                date,
                json,
            } => cmd_override_set(&svc, date, &targets.targets(), json),
            OverrideCommands::Clear { date, json } => cmd_override_clear(&svc, date, json),
            OverrideCommands::List { from, json } => cmd_override_list(&svc, from, json),
        },
        Commands::Goal { command } => match command {
            GoalCommands::Set {
                sex,
                age,
                height,
                weight,
                activity,
                goal,
                rate,
                protein,
                carbs,
                fat,
                json,
            } => {
                let profile = GoalProfile {
                    sex: sex.parse()?,
                    age_years: age,
                    height_cm: height,
                    weight_kg: weight,
                    activity_level: activity.parse()?,
                    goal: goal.parse()?,
                    weekly_rate_kg: rate,
                    protein_pct: protein,
                    carbs_pct: carbs,
                    fat_pct: fat,
                };
                cmd_goal_set(&svc, &profile, json)
            }
            GoalCommands::Show { json } => cmd_goal_show(&svc, json),
            GoalCommands::Clear { json } => cmd_goal_clear(&svc, json),
        },
        Commands::Redistribute {
            intake,
            date,
            dry_run,
            json,
        } => cmd_redistribute(&svc, intake.as_deref(), date, dry_run, json),
    }
}
