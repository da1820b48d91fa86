//! `tundra`: query flat record files from the command line.
//!
//! # Usage
//!
//! ```text
//! tundra types
//! tundra find countries 2
//! tundra query countries --where continent=EU --order name:desc --pluck name
//! tundra find-by countries name_and_density France 116
//! ```

mod criteria;

use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tundra_core::{Finder, OrderKey, RecordStore};
use tundra_files::{Catalog, CatalogConfig};

use criteria::{parse_criterion, parse_value};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tundra", version, about = "Query flat record files")]
struct Args {
  /// Path to the TOML catalog configuration.
  #[arg(short, long, value_name = "FILE", default_value = "tundra.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List record types and their record counts.
  Types,

  /// List the attributes discovered in a record type.
  Attributes { record_type: String },

  /// Print one record by primary key.
  Find { record_type: String, id: String },

  /// Filter, order and paginate records.
  Query(QueryArgs),

  /// Run a dynamic finder such as `name_and_density`.
  FindBy {
    record_type: String,
    expression:  String,
    values:      Vec<String>,
  },
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
  record_type: String,

  /// Keep records where ATTRIBUTE matches VALUE.
  #[arg(long = "where", value_name = "ATTRIBUTE=VALUE")]
  filters: Vec<String>,

  /// Drop records where ATTRIBUTE matches VALUE.
  #[arg(long = "where-not", value_name = "ATTRIBUTE=VALUE")]
  exclusions: Vec<String>,

  /// Sort key, `attribute` or `attribute:desc`.
  #[arg(long, value_name = "KEY")]
  order: Vec<String>,

  #[arg(long)]
  limit: Option<usize>,

  #[arg(long)]
  offset: Option<usize>,

  /// Print only these attributes.
  #[arg(long, value_name = "ATTRIBUTE")]
  pluck: Vec<String>,

  /// Print the number of matching records.
  #[arg(long, conflicts_with = "pluck")]
  count: bool,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let config = CatalogConfig::load(&args.config)
    .with_context(|| format!("failed to read {}", args.config.display()))?;
  let catalog = Catalog::from_config(&config).context("failed to build catalog")?;

  match args.command {
    Command::Types => {
      for name in catalog.names() {
        let store = catalog.get(name)?;
        let count = store
          .records()
          .with_context(|| format!("failed to load {name}"))?
          .len();
        println!("{name}\t{count}");
      }
    }
    Command::Attributes { record_type } => {
      let store = lookup(&catalog, &record_type)?;
      for attribute in store.attributes()? {
        println!("{attribute}");
      }
    }
    Command::Find { record_type, id } => {
      let store = lookup(&catalog, &record_type)?;
      let record = store.find(parse_value(&id))?;
      print_json(&record)?;
    }
    Command::Query(query) => run_query(&catalog, query)?,
    Command::FindBy {
      record_type,
      expression,
      values,
    } => {
      let store = lookup(&catalog, &record_type)?;
      let finder = Finder::parse(&expression)?;
      let record = finder.apply(&store.all(), values.iter().map(|v| parse_value(v)))?;
      print_json(&record)?;
    }
  }

  Ok(())
}

fn run_query(catalog: &Catalog, query: QueryArgs) -> Result<()> {
  let store = lookup(catalog, &query.record_type)?;

  let filters = query
    .filters
    .iter()
    .map(|f| parse_criterion(f))
    .collect::<Result<Vec<_>>>()?;
  let exclusions = query
    .exclusions
    .iter()
    .map(|f| parse_criterion(f))
    .collect::<Result<Vec<_>>>()?;
  let order = query
    .order
    .iter()
    .map(|k| k.parse::<OrderKey>())
    .collect::<Result<Vec<_>, _>>()?;

  let mut scope = store.all().filter(filters).exclude(exclusions).order(order);
  if let Some(limit) = query.limit {
    scope = scope.limit(limit);
  }
  if let Some(offset) = query.offset {
    scope = scope.offset(offset);
  }

  if query.count {
    println!("{}", scope.count()?);
    return Ok(());
  }
  if !query.pluck.is_empty() {
    let keys: Vec<&str> = query.pluck.iter().map(String::as_str).collect();
    return print_json(&scope.pluck(&keys)?);
  }
  print_json(&*scope.records()?)
}

fn lookup<'a>(catalog: &'a Catalog, record_type: &str) -> Result<&'a Arc<RecordStore>> {
  match catalog.get(record_type) {
    Ok(store) => Ok(store),
    Err(_) => {
      let known: Vec<&str> = catalog.names().map(|n| &**n).collect();
      bail!("unknown record type {record_type:?} (known: {})", known.join(", "))
    }
  }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  let mut stdout = std::io::stdout().lock();
  serde_json::to_writer_pretty(&mut stdout, value).context("failed to write JSON")?;
  writeln!(stdout)?;
  Ok(())
}
