mod app;
mod cache;
mod config;
mod error;
mod logging;
mod pagination;
mod pools;
mod progressive;
mod report;
mod sync;
mod task;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use crate::report::kinds::{get_suggestions, resolve_kind, resolve_kind_list};
use crate::report::types::FiscalYear;

#[derive(Parser, Debug)]
#[command(name = "repsync")]
#[command(about = "Offline-first sync and cache for business report data")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/repsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Fiscal year to work on, e.g. 2024-25
  #[arg(short, long, global = true)]
  year: Option<String>,

  /// Never call the report service
  #[arg(long, global = true)]
  offline: bool,

  /// Log at debug level unless REPSYNC_LOG is set
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch reports and refresh both local tiers
  Sync {
    /// Comma-separated kinds (names, aliases, or prefixes); default all
    #[arg(short, long)]
    kinds: Option<String>,
  },

  /// Show freshness of cached data and the recommended action
  Status,

  /// Print cached rows of one kind page by page
  Show {
    kind: String,

    /// Only rows whose text fields contain this (case-insensitive)
    #[arg(short, long)]
    filter: Option<String>,

    /// Number of pages to walk
    #[arg(short, long, default_value = "1")]
    pages: usize,
  },

  /// Delete old snapshot files
  Purge {
    /// Age in days (default: storage.snapshot_retention_days)
    #[arg(short, long)]
    days: Option<u64>,
  },

  /// Delete all cached data of a fiscal year
  ClearYear { year: String },

  /// Delete cached data of a kind across years, or only of --year if given
  Forget { kind: String },

  /// List report kinds and their aliases
  Kinds {
    /// Only kinds matching this name, alias, or prefix
    query: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Needs no config or data directory
  if let Command::Kinds { query } = &args.command {
    for entry in get_suggestions(query.as_deref().unwrap_or("")) {
      println!("{:<15} {:<28} {}", entry.name(), entry.description, entry.aliases.join(", "));
    }
    return Ok(());
  }

  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(year) = &args.year {
    config.fiscal_year = FiscalYear::parse(year)?;
  }
  if args.offline {
    config.offline_mode = true;
  }

  let _log_guard = logging::init(&config.storage.data_dir()?, args.verbose)?;

  let app = app::App::new(config)?;

  match args.command {
    Command::Sync { kinds } => {
      let kinds = match kinds {
        Some(list) => resolve_kind_list(&list)?,
        None => Vec::new(),
      };
      let report = app.sync(kinds).await?;
      if report.is_empty() {
        println!("nothing to sync");
      }
      for record in report.iter() {
        println!("{}", record);
      }
      if let Err(partial) = report.check() {
        eprintln!("{}; cached data is still available", partial);
      }
    }
    Command::Status => {
      let status = app.status().await;
      println!("fiscal year:  {}", app.year());
      match status.last_sync {
        Some(at) => println!("last sync:    {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("last sync:    never"),
      }
      println!("fresh:        {}", status.is_data_fresh);
      println!("can sync:     {}", status.can_sync);
      if !status.missing.is_empty() {
        println!("missing:      {}", join(&status.missing));
      }
      if !status.stale.is_empty() {
        println!("stale:        {}", join(&status.stale));
      }
      println!("recommended:  {}", status.recommended_action);
    }
    Command::Show { kind, filter, pages } => {
      app.show(resolve_kind(&kind)?, filter, pages).await?;
    }
    Command::Purge { days } => {
      println!("removed {} snapshot(s)", app.purge(days));
    }
    Command::ClearYear { year } => {
      let year = FiscalYear::parse(&year)?;
      let (slots, files) = app.clear_year(&year)?;
      println!("{}: cleared {} cached slot(s), {} snapshot(s)", year, slots, files);
    }
    Command::Forget { kind } => {
      let kind = resolve_kind(&kind)?;
      let (slots, files) = app.forget(kind, args.year.as_ref().map(|_| app.year()))?;
      println!("{}: cleared {} cached slot(s), {} snapshot(s)", kind, slots, files);
    }
    Command::Kinds { .. } => {}
  }

  Ok(())
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
  items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}
