use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{resolve_sport_key, Config};
use crate::db::PropStore;
use crate::error::{AppError, Result};
use crate::export::save_csv;
use crate::fetcher::OddsClient;
use crate::transform::{flatten_event, flatten_events};
use crate::types::{skipped_branches, ApiQuota, FlatRecord, IngestMode, RawEvent};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub sport: String,
    pub mode: IngestMode,
    pub events_fetched: usize,
    /// Per-event calls that failed and were skipped (props mode).
    pub events_failed: usize,
    pub records_flattened: usize,
    pub records_persisted: usize,
    pub failed_writes: usize,
    pub skipped_branches: u64,
    pub quota: ApiQuota,
    pub elapsed_ms: u128,
}

impl IngestSummary {
    fn new(sport: &str, mode: IngestMode) -> Self {
        Self {
            sport: sport.to_string(),
            mode,
            events_fetched: 0,
            events_failed: 0,
            records_flattened: 0,
            records_persisted: 0,
            failed_writes: 0,
            skipped_branches: 0,
            quota: ApiQuota::default(),
            elapsed_ms: 0,
        }
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ingestion summary: {} ({})", self.sport, self.mode)?;
        writeln!(f, "  events fetched:   {}", self.events_fetched)?;
        if self.events_failed > 0 {
            writeln!(f, "  events failed:    {}", self.events_failed)?;
        }
        writeln!(f, "  records flattened: {}", self.records_flattened)?;
        writeln!(f, "  records persisted: {}", self.records_persisted)?;
        if self.failed_writes > 0 {
            writeln!(f, "  failed writes:    {}", self.failed_writes)?;
        }
        if self.skipped_branches > 0 {
            writeln!(f, "  skipped branches: {}", self.skipped_branches)?;
        }
        writeln!(f, "  api quota:        {}", self.quota)?;
        write!(f, "  elapsed:          {}ms", self.elapsed_ms)
    }
}

/// Listing metadata wins; the odds response fills anything the listing lacked.
fn merge_event(listing: &RawEvent, odds: RawEvent) -> RawEvent {
    let pick = |a: &String, b: String| if a.is_empty() { b } else { a.clone() };
    RawEvent {
        id: pick(&listing.id, odds.id),
        sport_key: pick(&listing.sport_key, odds.sport_key),
        sport_title: pick(&listing.sport_title, odds.sport_title),
        home_team: pick(&listing.home_team, odds.home_team),
        away_team: pick(&listing.away_team, odds.away_team),
        commence_time: listing.commence_time.or(odds.commence_time),
        bookmakers: odds.bookmakers,
    }
}

/// Fetch, flatten and persist one sport. Calls are made one after another.
pub struct Ingestor {
    cfg: Config,
    client: OddsClient,
    store: PropStore,
    save_raw: Option<PathBuf>,
    save_csv: Option<PathBuf>,
}

impl Ingestor {
    pub fn new(cfg: Config, client: OddsClient, store: PropStore) -> Self {
        Self {
            cfg,
            client,
            store,
            save_raw: None,
            save_csv: None,
        }
    }

    /// Also write the fetched events as JSON to `path`.
    pub fn with_raw_dump(mut self, path: PathBuf) -> Self {
        self.save_raw = Some(path);
        self
    }

    /// Also write the flattened records as CSV to `path`.
    pub fn with_csv_export(mut self, path: PathBuf) -> Self {
        self.save_csv = Some(path);
        self
    }

    /// Auth and rate-limit failures abort the run. Anything narrower is
    /// logged, counted and skipped. Records already persisted stay persisted.
    pub async fn run(&mut self, sport: &str, mode: IngestMode) -> Result<IngestSummary> {
        let started = Instant::now();
        let sport = resolve_sport_key(sport);
        let skipped_before = skipped_branches();
        let mut summary = IngestSummary::new(&sport, mode);

        info!(sport = %sport, mode = %mode, "Starting ingestion");

        let (events, records) = match mode {
            IngestMode::Odds => {
                let events = self
                    .client
                    .odds(&sport, &self.cfg.regions, &self.cfg.markets, &self.cfg.odds_format)
                    .await?;
                let records = flatten_events(&events, Utc::now());
                self.persist(&records, &mut summary).await?;
                (events, records)
            }
            IngestMode::PlayerProps => self.fetch_props(&sport, &mut summary).await?,
        };
        summary.events_fetched = events.len();

        if records.is_empty() {
            info!(sport = %sport, "No records to persist");
        }

        if let Some(path) = &self.save_raw {
            match serde_json::to_vec_pretty(&events) {
                Ok(bytes) => match tokio::fs::write(path, bytes).await {
                    Ok(()) => info!("Saved raw events to {}", path.display()),
                    Err(e) => warn!("Could not save raw events to {}: {e}", path.display()),
                },
                Err(e) => warn!("Could not encode raw events: {e}"),
            }
        }

        if let Some(path) = &self.save_csv {
            match save_csv(path, &records).await {
                Ok(()) => info!("Saved {} records to {}", records.len(), path.display()),
                Err(e) => warn!("Could not save CSV to {}: {e}", path.display()),
            }
        }

        summary.skipped_branches = skipped_branches().saturating_sub(skipped_before);
        summary.quota = self.client.last_quota();
        summary.elapsed_ms = started.elapsed().as_millis();

        info!(
            event = "INGEST_DONE",
            sport = %summary.sport,
            mode = %summary.mode,
            events = summary.events_fetched,
            events_failed = summary.events_failed,
            persisted = summary.records_persisted,
            failed_writes = summary.failed_writes,
            skipped = summary.skipped_branches,
            "INGEST DONE | events: {} | records: {}/{} | quota: {}",
            summary.events_fetched,
            summary.records_persisted,
            summary.records_flattened,
            summary.quota,
        );

        Ok(summary)
    }

    async fn persist(&self, records: &[FlatRecord], summary: &mut IngestSummary) -> Result<()> {
        summary.records_flattened += records.len();
        if records.is_empty() {
            return Ok(());
        }
        let outcome = self.store.upsert(records).await?;
        summary.records_persisted += outcome.persisted;
        summary.failed_writes += outcome.failed;
        Ok(())
    }

    /// Events listing, then one event-odds call per qualifying event. Each
    /// event is persisted as soon as its odds arrive.
    async fn fetch_props(
        &mut self,
        sport: &str,
        summary: &mut IngestSummary,
    ) -> Result<(Vec<RawEvent>, Vec<FlatRecord>)> {
        let lookahead = self.cfg.props_lookahead_hours;
        let horizon = Duration::try_hours(lookahead)
            .and_then(|d| Utc::now().checked_add_signed(d))
            .ok_or_else(|| AppError::Config(format!("PROPS_LOOKAHEAD_HOURS out of range: {lookahead}")))?;

        let listing = self.client.events(sport).await?;

        let mut qualifying: Vec<RawEvent> = listing
            .into_iter()
            .filter(|e| !e.id.is_empty())
            .filter(|e| e.commence_time.is_some_and(|t| t < horizon))
            .collect();
        qualifying.sort_by_key(|e| e.commence_time);

        if qualifying.len() > self.cfg.props_max_events {
            debug!(
                total = qualifying.len(),
                cap = self.cfg.props_max_events,
                "Capping per-event requests"
            );
            qualifying.truncate(self.cfg.props_max_events);
        }

        if qualifying.is_empty() {
            info!(sport, lookahead_hours = lookahead, "No events within the lookahead window");
            return Ok((Vec::new(), Vec::new()));
        }

        let markets = self.cfg.prop_markets_for(sport);
        info!(sport, events = qualifying.len(), markets = %markets, "Fetching player props");

        let mut events = Vec::with_capacity(qualifying.len());
        let mut records = Vec::new();
        for listed in &qualifying {
            let res = self
                .client
                .event_odds(sport, &listed.id, &self.cfg.regions, &markets, &self.cfg.odds_format)
                .await;

            match res {
                Ok(odds) => {
                    let merged = merge_event(listed, odds);
                    let flat = flatten_event(&merged, Utc::now());
                    debug!(
                        event_id = %merged.id,
                        records = flat.len(),
                        "{} @ {}",
                        merged.away_team,
                        merged.home_team,
                    );
                    self.persist(&flat, summary).await?;
                    records.extend(flat);
                    events.push(merged);
                }
                Err(e) if e.is_run_fatal() => {
                    warn!(
                        event_id = %listed.id,
                        stored_events = events.len(),
                        persisted = summary.records_persisted,
                        "Aborting run: {e}"
                    );
                    return Err(e);
                }
                Err(e) => {
                    summary.events_failed += 1;
                    warn!(event_id = %listed.id, "Skipping event: {e}");
                }
            }
        }

        Ok((events, records))
    }
}
