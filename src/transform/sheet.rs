use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::types::FlatRecord;

/// Grouping key for a line value. Exact numeric match; `None` (no line, e.g.
/// moneyline) is its own bucket and sorts before every number.
#[derive(Debug, Clone, Copy)]
pub struct LineKey(Option<f64>);

impl LineKey {
    pub fn new(line: Option<f64>) -> Self {
        // -0.0 and 0.0 are the same line
        Self(line.map(|v| if v == 0.0 { 0.0 } else { v }))
    }

    pub fn value(self) -> Option<f64> {
        self.0
    }
}

impl PartialEq for LineKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LineKey {}

impl PartialOrd for LineKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LineKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.total_cmp(&b),
        }
    }
}

/// outcome label → price
pub type OutcomePrices = BTreeMap<String, Option<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineQuotes {
    pub line: Option<f64>,
    /// bookmaker label → outcome prices
    pub bookmakers: BTreeMap<String, OutcomePrices>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropLines {
    pub prop_type: String,
    pub lines: Vec<LineQuotes>,
}

/// Nested view of every quote for one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerPropSheet {
    pub subject: String,
    pub props: Vec<PropLines>,
}

impl PlayerPropSheet {
    pub fn empty(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            props: Vec::new(),
        }
    }

    pub fn has_data(&self) -> bool {
        !self.props.is_empty()
    }

    pub fn prop(&self, prop_type: &str) -> Option<&PropLines> {
        self.props.iter().find(|p| p.prop_type == prop_type)
    }
}

impl PropLines {
    #[cfg(test)]
    pub fn line(&self, line: Option<f64>) -> Option<&LineQuotes> {
        let key = LineKey::new(line);
        self.lines.iter().find(|l| LineKey::new(l.line) == key)
    }
}

fn title_or_key(r: &FlatRecord) -> &str {
    if r.bookmaker_title.is_empty() {
        &r.bookmaker_key
    } else {
        &r.bookmaker_title
    }
}

/// Display label per bookmaker key. Usually the title; a title shared by
/// several keys becomes "Title (key)" so their quotes stay apart.
pub(crate) fn bookmaker_labels(rows: &[FlatRecord]) -> HashMap<&str, String> {
    let mut keys_by_title: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for r in rows {
        keys_by_title
            .entry(title_or_key(r))
            .or_default()
            .insert(r.bookmaker_key.as_str());
    }

    rows.iter()
        .map(|r| {
            let title = title_or_key(r);
            let shared = keys_by_title.get(title).is_some_and(|keys| keys.len() > 1);
            let label = if shared {
                format!("{title} ({})", r.bookmaker_key)
            } else {
                title.to_string()
            };
            (r.bookmaker_key.as_str(), label)
        })
        .collect()
}

fn label_for(labels: &HashMap<&str, String>, r: &FlatRecord) -> String {
    labels
        .get(r.bookmaker_key.as_str())
        .cloned()
        .unwrap_or_else(|| title_or_key(r).to_string())
}

type LineTree = BTreeMap<LineKey, BTreeMap<String, OutcomePrices>>;
type SubjectTree = BTreeMap<String, BTreeMap<String, LineTree>>;

/// Group rows by subject → prop type → line → bookmaker → outcome.
/// A repeated (subject, prop, line, bookmaker, outcome) key keeps the later row.
pub fn build_sheets(rows: &[FlatRecord]) -> Vec<PlayerPropSheet> {
    let labels = bookmaker_labels(rows);
    let mut tree = SubjectTree::new();

    for r in rows {
        tree.entry(r.subject.clone())
            .or_default()
            .entry(r.prop_type.clone())
            .or_default()
            .entry(LineKey::new(r.line))
            .or_default()
            .entry(label_for(&labels, r))
            .or_default()
            .insert(r.outcome_name.clone(), r.price);
    }

    tree.into_iter()
        .map(|(subject, props)| PlayerPropSheet {
            subject,
            props: props
                .into_iter()
                .map(|(prop_type, lines)| PropLines {
                    prop_type,
                    lines: lines
                        .into_iter()
                        .map(|(line, bookmakers)| LineQuotes {
                            line: line.value(),
                            bookmakers,
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

/// Sheet for `subject`; empty when no row matches.
pub fn build_sheet(subject: &str, rows: &[FlatRecord]) -> PlayerPropSheet {
    let matching: Vec<FlatRecord> = rows
        .iter()
        .filter(|r| r.subject == subject)
        .cloned()
        .collect();

    build_sheets(&matching)
        .into_iter()
        .next()
        .unwrap_or_else(|| PlayerPropSheet::empty(subject))
}

// ---------------------------------------------------------------------------
// Cross-bookmaker comparison for one subject + prop type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineOutcomes {
    pub line: Option<f64>,
    pub outcomes: OutcomePrices,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookmakerLines {
    pub bookmaker: String,
    pub lines: Vec<LineOutcomes>,
}

/// bookmaker → line → outcome → price.
pub fn compare_lines(rows: &[FlatRecord]) -> Vec<BookmakerLines> {
    let labels = bookmaker_labels(rows);
    let mut tree: BTreeMap<String, BTreeMap<LineKey, OutcomePrices>> = BTreeMap::new();

    for r in rows {
        tree.entry(label_for(&labels, r))
            .or_default()
            .entry(LineKey::new(r.line))
            .or_default()
            .insert(r.outcome_name.clone(), r.price);
    }

    tree.into_iter()
        .map(|(bookmaker, lines)| BookmakerLines {
            bookmaker,
            lines: lines
                .into_iter()
                .map(|(line, outcomes)| LineOutcomes {
                    line: line.value(),
                    outcomes,
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::flatten::flatten_event;
    use crate::types::{RawBookmakerQuote, RawEvent, RawMarket, RawOutcome};
    use chrono::Utc;

    fn row(subject: &str, prop: &str, line: Option<f64>, book: &str, outcome: &str, price: Option<f64>) -> FlatRecord {
        FlatRecord {
            event_id: "ev1".to_string(),
            sport_key: "basketball_nba".to_string(),
            sport_title: "NBA".to_string(),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            commence_time: None,
            subject: subject.to_string(),
            prop_type: prop.to_string(),
            outcome_name: outcome.to_string(),
            price,
            line,
            bookmaker_key: book.to_lowercase(),
            bookmaker_title: book.to_string(),
            last_update: None,
            ingested_at: Utc::now(),
        }
    }

    fn smith_event() -> RawEvent {
        let outcome = |name: &str, price: f64| RawOutcome {
            name: name.to_string(),
            description: Some("J. Smith".to_string()),
            price: Some(price),
            point: Some(24.5),
        };
        RawEvent {
            id: "ev1".to_string(),
            sport_key: "basketball_nba".to_string(),
            sport_title: "NBA".to_string(),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            commence_time: None,
            bookmakers: vec![RawBookmakerQuote {
                key: "dk".to_string(),
                title: "DK".to_string(),
                last_update: None,
                markets: vec![RawMarket {
                    key: "player_points".to_string(),
                    last_update: None,
                    outcomes: vec![outcome("Over", 1.9), outcome("Under", 1.95)],
                }],
            }],
        }
    }

    #[test]
    fn flatten_then_rebuild_groups_under_player() {
        let rows = flatten_event(&smith_event(), Utc::now());
        let sheets = build_sheets(&rows);
        assert_eq!(sheets.len(), 1);

        let sheet = &sheets[0];
        assert_eq!(sheet.subject, "J. Smith");
        let line = sheet.prop("player_points").unwrap().line(Some(24.5)).unwrap();
        let dk = &line.bookmakers["DK"];
        assert_eq!(dk.len(), 2);
        assert_eq!(dk["Over"], Some(1.9));
        assert_eq!(dk["Under"], Some(1.95));
        // Never the reverse: "Over" is not a subject.
        assert!(sheets.iter().all(|s| s.subject != "Over"));
    }

    #[test]
    fn no_line_and_zero_line_are_separate_buckets() {
        let rows = vec![
            row("Team A", "spreads", Some(0.0), "DK", "Team A", Some(1.91)),
            row("Team A", "spreads", None, "DK", "Team A", Some(1.80)),
            row("Team A", "spreads", Some(-0.0), "FD", "Team A", Some(1.95)),
        ];
        let sheet = build_sheet("Team A", &rows);
        let lines = &sheet.prop("spreads").unwrap().lines;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, None);
        assert_eq!(lines[1].line, Some(0.0));
        assert_eq!(lines[1].bookmakers.len(), 2);
    }

    #[test]
    fn later_duplicate_wins() {
        let rows = vec![
            row("J. Smith", "player_points", Some(24.5), "DK", "Over", Some(1.9)),
            row("J. Smith", "player_points", Some(24.5), "DK", "Over", Some(2.0)),
        ];
        let sheet = build_sheet("J. Smith", &rows);
        let line = sheet.prop("player_points").unwrap().line(Some(24.5)).unwrap();
        assert_eq!(line.bookmakers["DK"]["Over"], Some(2.0));
    }

    #[test]
    fn lines_sort_ascending_and_props_alphabetically() {
        let rows = vec![
            row("J. Smith", "player_rebounds", Some(8.5), "DK", "Over", Some(1.8)),
            row("J. Smith", "player_points", Some(25.5), "DK", "Over", Some(2.1)),
            row("J. Smith", "player_points", Some(23.5), "FD", "Over", Some(1.7)),
        ];
        let sheet = build_sheet("J. Smith", &rows);
        let props: Vec<_> = sheet.props.iter().map(|p| p.prop_type.as_str()).collect();
        assert_eq!(props, ["player_points", "player_rebounds"]);
        let lines: Vec<_> = sheet.props[0].lines.iter().map(|l| l.line).collect();
        assert_eq!(lines, [Some(23.5), Some(25.5)]);
    }

    #[test]
    fn empty_input_is_an_empty_sheet() {
        let sheet = build_sheet("Nobody", &[]);
        assert_eq!(sheet.subject, "Nobody");
        assert!(!sheet.has_data());
        assert!(build_sheets(&[]).is_empty());
    }

    #[test]
    fn null_price_survives_reconstruction() {
        let rows = vec![row("J. Smith", "player_points", Some(24.5), "DK", "Over", None)];
        let sheet = build_sheet("J. Smith", &rows);
        let line = sheet.prop("player_points").unwrap().line(Some(24.5)).unwrap();
        assert_eq!(line.bookmakers["DK"].get("Over"), Some(&None));
    }

    #[test]
    fn compare_groups_by_bookmaker_then_line() {
        let rows = vec![
            row("J. Smith", "player_points", Some(24.5), "DK", "Over", Some(1.9)),
            row("J. Smith", "player_points", Some(24.5), "DK", "Under", Some(1.95)),
            row("J. Smith", "player_points", Some(25.5), "FD", "Over", Some(2.05)),
        ];
        let cmp = compare_lines(&rows);
        assert_eq!(cmp.len(), 2);
        assert_eq!(cmp[0].bookmaker, "DK");
        assert_eq!(cmp[0].lines[0].outcomes.len(), 2);
        assert_eq!(cmp[1].lines[0].line, Some(25.5));
    }

    #[test]
    fn blank_bookmaker_title_uses_key() {
        let mut r = row("Team A", "h2h", None, "DK", "Team A", Some(1.5));
        r.bookmaker_title.clear();
        let sheet = build_sheet("Team A", &[r]);
        assert!(sheet.props[0].lines[0].bookmakers.contains_key("dk"));
    }

    #[test]
    fn books_sharing_a_title_stay_separate() {
        let mut eu = row("J. Smith", "player_points", Some(24.5), "DK", "Over", Some(1.8));
        eu.bookmaker_key = "dk_eu".to_string();
        let rows = vec![
            row("J. Smith", "player_points", Some(24.5), "DK", "Over", Some(1.9)),
            eu,
            row("J. Smith", "player_points", Some(24.5), "FD", "Over", Some(1.85)),
        ];

        let sheet = build_sheet("J. Smith", &rows);
        let books = &sheet.prop("player_points").unwrap().line(Some(24.5)).unwrap().bookmakers;
        assert_eq!(books.len(), 3);
        assert_eq!(books["DK (dk)"]["Over"], Some(1.9));
        assert_eq!(books["DK (dk_eu)"]["Over"], Some(1.8));
        assert_eq!(books["FD"]["Over"], Some(1.85));

        let cmp = compare_lines(&rows);
        let names: Vec<_> = cmp.iter().map(|b| b.bookmaker.as_str()).collect();
        assert_eq!(names, ["DK (dk)", "DK (dk_eu)", "FD"]);
    }
}
