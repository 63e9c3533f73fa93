mod api;
mod config;
mod db;
mod error;
mod export;
mod fetcher;
mod ingest;
mod transform;
mod types;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState};
use crate::config::{resolve_sport_key, Config, DEFAULT_SPORT};
use crate::db::PropStore;
use crate::error::Result;
use crate::fetcher::OddsClient;
use crate::ingest::Ingestor;
use crate::transform::build_sheet;
use crate::types::IngestMode;

/// Odds and player-prop scraper for The Odds API
#[derive(Parser, Debug)]
#[command(name = "odds-props")]
#[command(author, version, about = "Fetch odds and player props into SQLite and serve them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch one sport and upsert its quotes
    Ingest {
        /// Sport key or shortcut (nba, nfl, mlb, nhl, ncaab, ncaaf, soccer)
        #[arg(default_value = DEFAULT_SPORT)]
        sport: String,
        /// Fetch player props per event instead of full-game odds
        #[arg(long)]
        player_props: bool,
        /// Bookmaker regions, e.g. "us,uk"
        #[arg(long)]
        regions: Option<String>,
        /// Markets for odds mode, or prop markets with --player-props
        #[arg(long)]
        markets: Option<String>,
        /// "decimal" or "american"
        #[arg(long)]
        odds_format: Option<String>,
        /// Also write the fetched events as JSON to this path
        #[arg(long)]
        save_raw: Option<PathBuf>,
        /// Also write the flattened records as CSV to this path
        #[arg(long)]
        save_csv: Option<PathBuf>,
    },

    /// Serve the dashboard and read-only JSON API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List sports offered upstream
    Sports {
        /// Include out-of-season sports
        #[arg(long)]
        all: bool,
    },

    /// Print the stored prop sheet for one player
    Player {
        name: String,
        #[arg(long)]
        sport: Option<String>,
        /// Only this prop type, e.g. player_points
        #[arg(long)]
        prop: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cli, cfg).await {
        error!("Fatal error: {e}");
        if let Some(hint) = e.remediation() {
            error!("Hint: {hint}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mut cfg: Config) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            sport,
            player_props,
            regions,
            markets,
            odds_format,
            save_raw,
            save_csv,
        } => {
            let mode = if player_props { IngestMode::PlayerProps } else { IngestMode::Odds };
            if let Some(r) = regions {
                cfg.regions = r;
            }
            if let Some(f) = odds_format {
                cfg.odds_format = f;
            }
            if let Some(m) = markets {
                match mode {
                    IngestMode::Odds => cfg.markets = m,
                    IngestMode::PlayerProps => cfg.prop_markets = Some(m),
                }
            }

            let client = OddsClient::new(&cfg)?;
            let store = PropStore::open(&cfg).await?;
            let mut ingestor = Ingestor::new(cfg, client, store);
            if let Some(path) = save_raw {
                ingestor = ingestor.with_raw_dump(path);
            }
            if let Some(path) = save_csv {
                ingestor = ingestor.with_csv_export(path);
            }

            let summary = ingestor.run(&sport, mode).await?;
            println!("{summary}");
        }

        Commands::Serve { port } => {
            let store = PropStore::open(&cfg).await?;
            if store.count().await? == 0 {
                warn!("Database is empty. Run `odds-props ingest <sport>` to populate it.");
            }

            let app = router(ApiState::new(store));
            let bind_addr = format!("0.0.0.0:{}", port.unwrap_or(cfg.api_port));
            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            info!("HTTP API listening on {bind_addr}");

            axum::serve(listener, app).await?;
        }

        Commands::Sports { all } => {
            let mut client = OddsClient::new(&cfg)?;
            let sports = client.sports(all).await?;
            for s in &sports {
                let marker = if s.active { ' ' } else { '*' };
                println!("{marker} {:<40} {:<20} {}", s.key, s.group, s.title);
            }
            println!("{} sports | quota: {}", sports.len(), client.last_quota());
        }

        Commands::Player { name, sport, prop } => {
            let store = PropStore::open(&cfg).await?;
            let sport = sport.map(|s| resolve_sport_key(&s));
            let rows = store.query_by_subject(&name, sport.as_deref()).await?;
            let sheet = build_sheet(&name, &rows);

            match prop {
                _ if !sheet.has_data() => println!("{name}: {}", api::routes::NO_DATA_MESSAGE),
                Some(p) => match sheet.prop(&p) {
                    Some(lines) => println!("{}", serde_json::to_string_pretty(lines)?),
                    None => println!("{name}: no {p} quotes"),
                },
                None => println!("{}", serde_json::to_string_pretty(&sheet)?),
            }
        }
    }

    Ok(())
}
