use chrono::{DateTime, Utc};

use crate::types::{FlatRecord, RawEvent, RawOutcome};

/// Who an outcome is about, and which side of the market it prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubject<'a> {
    pub subject: &'a str,
    pub side: &'a str,
}

/// A non-blank description names the subject (a player) and the outcome name
/// is the side ("Over"/"Under"). Without one, the outcome name is both
/// subject and side (a team on h2h/spreads).
///
/// Upstream has no explicit player-prop flag; the presence of `description`
/// is the only signal, so keep this the single place that decides it.
pub fn resolve_subject<'a>(description: Option<&'a str>, name: &'a str) -> ResolvedSubject<'a> {
    match description.map(str::trim).filter(|d| !d.is_empty()) {
        Some(player) => ResolvedSubject { subject: player, side: name },
        None => ResolvedSubject { subject: name, side: name },
    }
}

impl RawOutcome {
    pub fn resolved(&self) -> ResolvedSubject<'_> {
        resolve_subject(self.description.as_deref(), &self.name)
    }
}

/// One record per (bookmaker, market, outcome) reachable from `event`.
/// Outcomes without a price or line are kept with `None`.
pub fn flatten_event(event: &RawEvent, ingested_at: DateTime<Utc>) -> Vec<FlatRecord> {
    let mut records = Vec::with_capacity(event.outcome_count());

    for bookmaker in &event.bookmakers {
        for market in &bookmaker.markets {
            let last_update = market.last_update.or(bookmaker.last_update);

            for outcome in &market.outcomes {
                let resolved = outcome.resolved();
                records.push(FlatRecord {
                    event_id: event.id.clone(),
                    sport_key: event.sport_key.clone(),
                    sport_title: event.sport_title.clone(),
                    home_team: event.home_team.clone(),
                    away_team: event.away_team.clone(),
                    commence_time: event.commence_time,
                    subject: resolved.subject.to_string(),
                    prop_type: market.key.clone(),
                    outcome_name: resolved.side.to_string(),
                    price: outcome.price,
                    line: outcome.point,
                    bookmaker_key: bookmaker.key.clone(),
                    bookmaker_title: bookmaker.title.clone(),
                    last_update,
                    ingested_at,
                });
            }
        }
    }

    records
}

pub fn flatten_events(events: &[RawEvent], ingested_at: DateTime<Utc>) -> Vec<FlatRecord> {
    events
        .iter()
        .flat_map(|e| flatten_event(e, ingested_at))
        .collect()
}
