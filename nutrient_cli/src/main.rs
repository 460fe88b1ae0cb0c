use clap::{Parser, Subcommand};
use nutrient_core::*;
use std::path::{Path, PathBuf};

mod shell;

#[derive(Parser)]
#[command(name = "nutrilook")]
#[command(about = "Food nutrient lookup with nutrient exclusions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init {
        /// Also write the effective configuration to the config file
        #[arg(long)]
        write_config: bool,
    },

    /// Replace the food tables with a FoodData Central CSV export
    LoadCsv {
        /// Directory holding food.csv, nutrient.csv and food_nutrient.csv
        #[arg(long)]
        csv_data_path: PathBuf,

        /// Rows per insert transaction
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Page through the FoodData Central food list and append it
    Fetch {
        #[arg(long)]
        max_pages: Option<u32>,

        #[arg(long)]
        page_size: Option<u32>,

        /// Write per-page CSV snapshots here
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },

    /// Print the API detail document of one food
    FetchFood { fdc_id: FdcId },

    /// Search foods by description
    Foods {
        #[arg(default_value = "")]
        term: String,

        /// Apply the exclusions saved for this user
        #[arg(long)]
        user: Option<String>,

        /// Nutrient number to exclude (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<NutrientNbr>,
    },

    /// Search nutrients by name
    Nutrients {
        #[arg(default_value = "")]
        term: String,
    },

    /// Show the nutrient breakdown of one food
    Breakdown { fdc_id: FdcId },

    /// Show fact counts per nutrient
    Bubble,

    /// Save a nutrient exclusion for a user
    Exclude {
        #[arg(long)]
        user: String,
        nutrient_nbr: NutrientNbr,
    },

    /// List the exclusions saved for a user
    Exclusions {
        #[arg(long)]
        user: String,
    },

    /// Remove a saved nutrient exclusion
    Unexclude {
        #[arg(long)]
        user: String,
        nutrient_nbr: NutrientNbr,
    },

    /// Interactive dashboard on stdin
    Shell,
}

fn main() -> Result<()> {
    // Initialize logging
    nutrient_core::logging::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);

    let store = Store::open(&config.database.path, config.database.pool_size)?;
    store.init_schema()?;

    let result = run(cli.command, &store, &config, &config_path, cli.json);
    store.close();
    result
}

fn run(
    command: Commands,
    store: &Store,
    config: &Config,
    config_path: &Path,
    json: bool,
) -> Result<()> {
    match command {
        Commands::Init { write_config } => {
            if write_config {
                config.save_to(config_path)?;
                println!("✓ Wrote config to {}", config_path.display());
            }
            let counts = store.table_counts()?;
            println!("✓ Schema ready");
            println!(
                "  {} foods, {} nutrients, {} facts",
                counts.foods, counts.nutrients, counts.facts
            );
            Ok(())
        }
        Commands::LoadCsv {
            csv_data_path,
            batch_size,
        } => cmd_load_csv(store, config, csv_data_path, batch_size, json),
        Commands::Fetch {
            max_pages,
            page_size,
            snapshot_dir,
        } => cmd_fetch(store, config, max_pages, page_size, snapshot_dir, json),
        Commands::FetchFood { fdc_id } => {
            let client = UsdaClient::from_config(config)?;
            let detail = client.fetch_food(fdc_id)?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
            Ok(())
        }
        Commands::Foods {
            term,
            user,
            exclude,
        } => {
            let mut excluded = match user.as_deref() {
                Some(user) => store.load_user_exclusions(user)?,
                None => Vec::new(),
            };
            for id in exclude {
                if !excluded.contains(&id) {
                    excluded.push(id);
                }
            }
            let rows = store.search_food_by_description(&term, &excluded)?;
            render(&View::FoodTable(rows), json)
        }
        Commands::Nutrients { term } => {
            let rows = store.search_nutrient_by_name(&term)?;
            render(&View::NutrientTable(rows), json)
        }
        Commands::Breakdown { fdc_id } => {
            let slices = store.nutrient_breakdown_for_food(fdc_id)?;
            let title = format!("Nutrients in Food {}", fdc_id);
            render(
                &View::PieChart(dashboard::PieChart { title, slices }),
                json,
            )
        }
        Commands::Bubble => render(&View::BubbleChart(store.bubble_summary()?), json),
        Commands::Exclude { user, nutrient_nbr } => {
            let nutrient = store.nutrient_by_nbr(nutrient_nbr)?.ok_or_else(|| {
                Error::Other(format!("Unknown nutrient number {}", nutrient_nbr))
            })?;

            let mut session = SessionExclusions::new();
            session.load_for_user(store, &user)?;
            let added = session.add(store, Some(&user), &nutrient)?;
            if !json {
                if added {
                    println!("✓ Excluding {} for {}", nutrient.name, user);
                } else {
                    println!("{} is already excluded for {}", nutrient.name, user);
                }
            }
            render(&View::ExclusionList(session.entries().to_vec()), json)
        }
        Commands::Exclusions { user } => {
            let mut session = SessionExclusions::new();
            session.load_for_user(store, &user)?;
            render(&View::ExclusionList(session.entries().to_vec()), json)
        }
        Commands::Unexclude { user, nutrient_nbr } => {
            let mut session = SessionExclusions::new();
            session.load_for_user(store, &user)?;
            let removed = session.remove(store, Some(&user), nutrient_nbr)?;
            if !json {
                if removed {
                    println!("✓ Removed exclusion {} for {}", nutrient_nbr, user);
                } else {
                    println!("No exclusion {} saved for {}", nutrient_nbr, user);
                }
            }
            render(&View::ExclusionList(session.entries().to_vec()), json)
        }
        Commands::Shell => {
            let stdin = std::io::stdin();
            shell::run(Dashboard::new(store.clone()), stdin.lock(), json)
        }
    }
}

fn cmd_load_csv(
    store: &Store,
    config: &Config,
    csv_data_path: PathBuf,
    batch_size: Option<usize>,
    json: bool,
) -> Result<()> {
    let batch_size = batch_size.unwrap_or(config.ingest.batch_size);
    let summary = load_csv_dir(store, &csv_data_path, batch_size)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("✓ Loaded CSV data from {}", csv_data_path.display());
    println!("  Foods:     {}", summary.foods);
    println!("  Nutrients: {}", summary.nutrients);
    println!("  Facts:     {}", summary.facts);
    if summary.skipped > 0 {
        println!("  Skipped:   {}", summary.skipped);
    }
    print_totals(store)
}

fn cmd_fetch(
    store: &Store,
    config: &Config,
    max_pages: Option<u32>,
    page_size: Option<u32>,
    snapshot_dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let client = UsdaClient::from_config(config)?;
    let options = PaginationOptions {
        page_size: page_size.unwrap_or(config.api.page_size),
        max_pages: max_pages.unwrap_or(config.api.max_pages),
        snapshot_dir: snapshot_dir.or_else(|| config.ingest.snapshot_dir.clone()),
    };

    let summary = ingest_from_api(store, &client, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("✓ Ingested {} pages", summary.pages);
    println!("  Foods:     {}", summary.foods);
    println!("  Facts:     {}", summary.facts);
    println!("  Nutrients: {}", summary.nutrients);
    match &summary.stopped {
        StopReason::EmptyPage { page } => println!("  Stopped at empty page {}", page),
        StopReason::FetchFailed { page, error } => {
            println!("  Stopped: page {} failed ({})", page, error)
        }
        StopReason::PageLimit => println!("  Stopped at the page limit"),
    }
    print_totals(store)
}

fn print_totals(store: &Store) -> Result<()> {
    let counts = store.table_counts()?;
    println!(
        "  Database now holds {} foods, {} nutrients, {} facts",
        counts.foods, counts.nutrients, counts.facts
    );
    Ok(())
}

/// Print a view as a text table, or as JSON
pub(crate) fn render(view: &View, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(view)?);
        return Ok(());
    }

    match view {
        View::FoodTable(rows) => {
            if rows.is_empty() {
                println!("(no foods)");
                return Ok(());
            }
            println!(
                "{:<3} {:<10} {:<22} {:<12} description",
                "#", "fdc_id", "data_type", "published"
            );
            for (i, row) in rows.iter().enumerate() {
                println!(
                    "{:<3} {:<10} {:<22} {:<12} {}",
                    i,
                    row.fdc_id,
                    row.data_type,
                    row.publication_date.as_deref().unwrap_or("-"),
                    row.description
                );
            }
        }
        View::NutrientTable(rows) => {
            if rows.is_empty() {
                println!("(no nutrients)");
                return Ok(());
            }
            println!(
                "{:<3} {:<8} {:<8} {:<8} {:<8} name",
                "#", "nbr", "id", "unit", "rank"
            );
            for (i, row) in rows.iter().enumerate() {
                let rank = row.rank.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:<3} {:<8} {:<8} {:<8} {:<8} {}",
                    i, row.nutrient_nbr, row.id, row.unit_name, rank, row.name
                );
            }
        }
        View::ExclusionList(entries) => {
            if entries.is_empty() {
                println!("(no exclusions)");
            }
            for entry in entries {
                println!("  {}  [remove {}]", entry.label(), entry.nutrient_id);
            }
        }
        View::PieChart(chart) => {
            println!("{}", chart.title);
            if chart.slices.is_empty() {
                println!("  (no nutrients)");
            }
            for slice in &chart.slices {
                println!("  {:<40} {}", slice.name, slice.amount);
            }
        }
        View::BubbleChart(points) => {
            println!("Nutrient Amount in All Foods");
            for point in points {
                println!(
                    "  {:<2} {:<40} {:<8} {}",
                    point.label, point.name, point.unit_name, point.count
                );
            }
        }
        View::Unchanged => {}
    }
    Ok(())
}
