//! Core domain model for regional activity leveling: neighborhood keys,
//! aggregation windows, per-region counters, scoring and level mapping.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;

pub const CRATE_NAME: &str = "rale-core";

pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Wire keys of the neighborhood fields inside platform address objects.
pub const REGION_KEY: &str = "sido";
pub const DISTRICT_KEY: &str = "sigungu";
pub const SUBDISTRICT_KEY: &str = "eupmyundong";

pub const LEVEL_TWO_MIN_SCORE: u8 = 30;
pub const LEVEL_THREE_MIN_SCORE: u8 = 60;

pub const WEIGHT_TOTAL: u32 = 100;

pub type ProposerId = String;

/// Finest tracked neighborhood granularity. All three parts are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "JsonValue")]
pub struct NeighborhoodKey {
    #[serde(rename = "sido")]
    region: String,
    #[serde(rename = "sigungu")]
    district: String,
    #[serde(rename = "eupmyundong")]
    subdistrict: String,
}

impl NeighborhoodKey {
    pub fn new(
        region: impl Into<String>,
        district: impl Into<String>,
        subdistrict: impl Into<String>,
    ) -> Option<Self> {
        let key = Self {
            region: region.into(),
            district: district.into(),
            subdistrict: subdistrict.into(),
        };
        if key.region.is_empty() || key.district.is_empty() || key.subdistrict.is_empty() {
            return None;
        }
        Some(key)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn district(&self) -> &str {
        &self.district
    }

    pub fn subdistrict(&self) -> &str {
        &self.subdistrict
    }

    /// Address object in the platform's wire shape.
    pub fn to_address(&self) -> JsonValue {
        serde_json::json!({
            REGION_KEY: self.region,
            DISTRICT_KEY: self.district,
            SUBDISTRICT_KEY: self.subdistrict,
        })
    }
}

impl fmt::Display for NeighborhoodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.region, self.district, self.subdistrict)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("address is missing one of sido, sigungu, eupmyundong")]
pub struct IncompleteAddress;

impl TryFrom<JsonValue> for NeighborhoodKey {
    type Error = IncompleteAddress;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        canonicalize(&value).ok_or(IncompleteAddress)
    }
}

/// Extracts a neighborhood key from a loosely-typed address object.
///
/// Values are taken as given: no trimming or case folding. Strings and
/// numbers are accepted; anything else, an empty string, or a missing key
/// rejects the whole record.
pub fn canonicalize(raw: &JsonValue) -> Option<NeighborhoodKey> {
    let map = raw.as_object()?;
    let part = |key: &str| match map.get(key)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    };
    NeighborhoodKey::new(part(REGION_KEY)?, part(DISTRICT_KEY)?, part(SUBDISTRICT_KEY)?)
}

/// Half-open aggregation range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("ambiguous window: `{given}` was supplied without `{missing}`")]
    Partial {
        given: &'static str,
        missing: &'static str,
    },
    #[error("window start {start} is not before end {end}")]
    Empty {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if start >= end {
            return Err(WindowError::Empty { start, end });
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending at `end`. Saturates at the earliest
    /// representable instant.
    pub fn trailing(end: DateTime<Utc>, days: i64) -> Self {
        let start = Duration::try_days(days)
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Turns optional manual bounds into a concrete window.
#[derive(Debug, Clone, Copy)]
pub struct WindowResolver {
    window_days: i64,
    offset: FixedOffset,
}

impl WindowResolver {
    pub fn new(window_days: i64, offset: FixedOffset) -> Self {
        Self {
            window_days: window_days.max(1),
            offset,
        }
    }

    pub fn window_days(&self) -> i64 {
        self.window_days
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn default_window(&self, now: DateTime<Utc>) -> Window {
        Window::trailing(now, self.window_days)
    }

    /// Both bounds or neither. A bound that fails to parse is logged; a
    /// surviving end still anchors a trailing window, otherwise it ends now.
    pub fn resolve(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Window, WindowError> {
        match (start, end) {
            (None, None) => Ok(self.default_window(now)),
            (Some(_), None) => Err(WindowError::Partial {
                given: "start",
                missing: "end",
            }),
            (None, Some(_)) => Err(WindowError::Partial {
                given: "end",
                missing: "start",
            }),
            (Some(start_raw), Some(end_raw)) => {
                match (self.parse_bound(start_raw), self.parse_bound(end_raw)) {
                    (Some(start), Some(end)) => Window::new(start, end),
                    (None, Some(end)) => Ok(Window::trailing(end, self.window_days)),
                    (_, None) => Ok(self.default_window(now)),
                }
            }
        }
    }

    fn parse_bound(&self, raw: &str) -> Option<DateTime<Utc>> {
        let parsed = parse_timestamp(raw, self.offset);
        if parsed.is_none() {
            warn!(value = raw, "invalid ISO-8601 window bound; using default window");
        }
        parsed
    }
}

/// Parses an ISO-8601 timestamp. Naive values are read in `offset`.
pub fn parse_timestamp(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let zoned = [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M%:z",
        "%Y-%m-%dT%H:%M%z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%z",
    ]
    .iter()
    .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok());
    if let Some(dt) = zoned {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses offsets such as `+09:00`; `Z` and `UTC` mean zero.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    match raw.trim() {
        "Z" | "z" | "UTC" | "utc" => FixedOffset::east_opt(0),
        other => other.parse().ok(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Visits,
    Likes,
    Proposals,
    Fundings,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Visits,
        Metric::Likes,
        Metric::Proposals,
        Metric::Fundings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Visits => "visits",
            Metric::Likes => "likes",
            Metric::Proposals => "proposals",
            Metric::Fundings => "fundings",
        }
    }
}

/// One location check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub at: DateTime<Utc>,
    pub address: JsonValue,
}

/// Authored proposal, like or completed payment, reduced to the address it
/// resolves to. `JsonValue::Null` when the related item has no address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySignal {
    pub address: JsonValue,
}

impl ActivitySignal {
    pub fn new(address: JsonValue) -> Self {
        Self { address }
    }
}

/// Raw per-neighborhood counters for one proposer and one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionStats {
    pub visits: u32,
    pub likes: u32,
    pub proposals: u32,
    pub fundings: u32,
}

impl RegionStats {
    pub fn get(&self, metric: Metric) -> u32 {
        match metric {
            Metric::Visits => self.visits,
            Metric::Likes => self.likes,
            Metric::Proposals => self.proposals,
            Metric::Fundings => self.fundings,
        }
    }

    fn bump(&mut self, metric: Metric) {
        let slot = match metric {
            Metric::Visits => &mut self.visits,
            Metric::Likes => &mut self.likes,
            Metric::Proposals => &mut self.proposals,
            Metric::Fundings => &mut self.fundings,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn clamped(&self, caps: &MetricTable) -> Self {
        Self {
            visits: self.visits.min(caps.visits),
            likes: self.likes.min(caps.likes),
            proposals: self.proposals.min(caps.proposals),
            fundings: self.fundings.min(caps.fundings),
        }
    }
}

/// Everything one proposer did inside a window, as returned by the signal
/// stores. Records with incomplete addresses are carried but never counted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposerSignals {
    pub visits: Vec<VisitRecord>,
    pub proposals: Vec<ActivitySignal>,
    pub likes: Vec<ActivitySignal>,
    pub fundings: Vec<ActivitySignal>,
}

impl ProposerSignals {
    /// Union of every neighborhood that canonicalizes across all sources.
    pub fn candidate_regions(&self) -> BTreeSet<NeighborhoodKey> {
        self.visits
            .iter()
            .map(|v| &v.address)
            .chain(self.proposals.iter().map(|s| &s.address))
            .chain(self.likes.iter().map(|s| &s.address))
            .chain(self.fundings.iter().map(|s| &s.address))
            .filter_map(canonicalize)
            .collect()
    }

    /// Counters for each requested region. Visits count distinct calendar
    /// dates in `offset`, the other metrics count records.
    pub fn region_stats(
        &self,
        regions: &BTreeSet<NeighborhoodKey>,
        offset: FixedOffset,
    ) -> BTreeMap<NeighborhoodKey, RegionStats> {
        let mut stats: BTreeMap<NeighborhoodKey, RegionStats> = regions
            .iter()
            .map(|r| (r.clone(), RegionStats::default()))
            .collect();

        let mut visit_days: BTreeMap<NeighborhoodKey, BTreeSet<NaiveDate>> = BTreeMap::new();
        for visit in &self.visits {
            if let Some(key) = canonicalize(&visit.address) {
                visit_days
                    .entry(key)
                    .or_default()
                    .insert(visit.at.with_timezone(&offset).date_naive());
            }
        }
        for (key, days) in visit_days {
            if let Some(entry) = stats.get_mut(&key) {
                entry.visits = u32::try_from(days.len()).unwrap_or(u32::MAX);
            }
        }

        for (signals, metric) in [
            (&self.likes, Metric::Likes),
            (&self.proposals, Metric::Proposals),
            (&self.fundings, Metric::Fundings),
        ] {
            for signal in signals {
                let Some(key) = canonicalize(&signal.address) else {
                    continue;
                };
                if let Some(entry) = stats.get_mut(&key) {
                    entry.bump(metric);
                }
            }
        }

        stats
    }
}

/// One value per metric; used for both caps and weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTable {
    pub visits: u32,
    pub likes: u32,
    pub proposals: u32,
    pub fundings: u32,
}

impl MetricTable {
    pub fn get(&self, metric: Metric) -> u32 {
        match metric {
            Metric::Visits => self.visits,
            Metric::Likes => self.likes,
            Metric::Proposals => self.proposals,
            Metric::Fundings => self.fundings,
        }
    }

    pub fn total(&self) -> u32 {
        Metric::ALL.iter().map(|m| self.get(*m)).sum()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoringConfigError {
    #[error("scoring weights must sum to 100, got {0}")]
    WeightSum(u32),
    #[error("cap for {0} must be greater than zero")]
    ZeroCap(&'static str),
}

/// Caps and weights fed to [`ScoreCalculator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreConfig {
    #[serde(default = "ScoreConfig::default_caps")]
    pub caps: MetricTable,
    #[serde(default = "ScoreConfig::default_weights")]
    pub weights: MetricTable,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            caps: Self::default_caps(),
            weights: Self::default_weights(),
        }
    }
}

impl ScoreConfig {
    pub fn default_caps() -> MetricTable {
        MetricTable {
            visits: 7,
            likes: 10,
            proposals: 5,
            fundings: 3,
        }
    }

    pub fn default_weights() -> MetricTable {
        MetricTable {
            visits: 40,
            likes: 20,
            proposals: 20,
            fundings: 20,
        }
    }

    pub fn validate(&self) -> Result<(), ScoringConfigError> {
        if let Some(metric) = Metric::ALL.iter().find(|m| self.caps.get(**m) == 0) {
            return Err(ScoringConfigError::ZeroCap(metric.as_str()));
        }
        let total = self.weights.total();
        if total != WEIGHT_TOTAL {
            return Err(ScoringConfigError::WeightSum(total));
        }
        Ok(())
    }
}

/// Converts counters into a 0-100 score. Each metric contributes
/// `min(raw, cap) / cap * weight`; the sum rounds half to even.
#[derive(Debug, Clone, Copy)]
pub struct ScoreCalculator {
    config: ScoreConfig,
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self {
            config: ScoreConfig::default(),
        }
    }
}

impl ScoreCalculator {
    pub fn new(config: ScoreConfig) -> Result<Self, ScoringConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    pub fn score(&self, stats: &RegionStats) -> u8 {
        let clamped = stats.clamped(&self.config.caps);
        let raw: f64 = Metric::ALL
            .iter()
            .map(|&metric| {
                let cap = f64::from(self.config.caps.get(metric));
                let weight = f64::from(self.config.weights.get(metric));
                f64::from(clamped.get(metric)) / cap * weight
            })
            .sum();
        raw.round_ties_even().clamp(0.0, f64::from(WEIGHT_TOTAL)) as u8
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("level must be 1, 2 or 3, got {0}")]
pub struct InvalidLevel(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    One = 1,
    Two = 2,
    Three = 3,
}

impl Level {
    pub fn from_score(score: u8) -> Self {
        if score >= LEVEL_THREE_MIN_SCORE {
            Level::Three
        } else if score >= LEVEL_TWO_MIN_SCORE {
            Level::Two
        } else {
            Level::One
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

pub fn level_of(score: u8) -> Level {
    Level::from_score(score)
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for Level {
    type Error = InvalidLevel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Level::try_from(i64::from(value))
    }
}

impl TryFrom<i16> for Level {
    type Error = InvalidLevel;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Level::try_from(i64::from(value))
    }
}

impl TryFrom<i64> for Level {
    type Error = InvalidLevel;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Level::One),
            2 => Ok(Level::Two),
            3 => Ok(Level::Three),
            other => Err(InvalidLevel(other)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Persisted "proposer is level N in this neighborhood" row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub id: i64,
    pub proposer_id: ProposerId,
    pub neighborhood: NeighborhoodKey,
    pub level: Level,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn addr(sido: &str, sigungu: &str, eup: &str) -> JsonValue {
        json!({ "sido": sido, "sigungu": sigungu, "eupmyundong": eup })
    }

    fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn visit(at: &str, address: &JsonValue) -> VisitRecord {
        VisitRecord {
            at: ts(at),
            address: address.clone(),
        }
    }

    fn stats(visits: u32, likes: u32, proposals: u32, fundings: u32) -> RegionStats {
        RegionStats {
            visits,
            likes,
            proposals,
            fundings,
        }
    }

    #[test]
    fn canonicalize_accepts_complete_addresses_verbatim() {
        let key = canonicalize(&json!({
            "sido": "Seoul",
            "sigungu": " Mapo-gu",
            "eupmyundong": "Seogyo-dong",
            "detail": "ignored"
        }))
        .expect("complete address");
        assert_eq!(key.region(), "Seoul");
        assert_eq!(key.district(), " Mapo-gu");
        assert_eq!(key.subdistrict(), "Seogyo-dong");
    }

    #[test]
    fn canonicalize_rejects_incomplete_or_non_map_input() {
        assert!(canonicalize(&json!({ "sido": "Seoul", "sigungu": "Mapo-gu" })).is_none());
        assert!(canonicalize(&addr("Seoul", "", "Seogyo-dong")).is_none());
        let null_district = json!({ "sido": "Seoul", "sigungu": null, "eupmyundong": "x" });
        assert!(canonicalize(&null_district).is_none());
        assert!(canonicalize(&json!(["Seoul", "Mapo-gu", "Seogyo-dong"])).is_none());
        assert!(canonicalize(&JsonValue::Null).is_none());
        assert!(canonicalize(&json!("Seoul Mapo-gu Seogyo-dong")).is_none());
    }

    #[test]
    fn neighborhood_key_round_trips_through_wire_shape() {
        let key = NeighborhoodKey::new("Seoul", "Mapo-gu", "Seogyo-dong").unwrap();
        let decoded: NeighborhoodKey = serde_json::from_value(key.to_address()).unwrap();
        assert_eq!(decoded, key);
        assert!(serde_json::from_value::<NeighborhoodKey>(json!({ "sido": "Seoul" })).is_err());
        assert!(NeighborhoodKey::new("Seoul", "Mapo-gu", "").is_none());
    }

    #[test]
    fn resolver_defaults_to_trailing_window() {
        let resolver = WindowResolver::new(DEFAULT_WINDOW_DAYS, kst());
        let now = ts("2025-08-25T00:00:00Z");
        let window = resolver.resolve(None, None, now).unwrap();
        assert_eq!(window.end, now);
        assert_eq!(window.start, ts("2025-08-18T00:00:00Z"));
    }

    #[test]
    fn resolver_rejects_partial_windows() {
        let resolver = WindowResolver::new(7, kst());
        let now = ts("2025-08-25T00:00:00Z");
        assert_eq!(
            resolver.resolve(Some("2025-08-18T00:00:00+09:00"), None, now),
            Err(WindowError::Partial {
                given: "start",
                missing: "end"
            })
        );
        assert!(matches!(
            resolver.resolve(None, Some("2025-08-25T00:00:00+09:00"), now),
            Err(WindowError::Partial { given: "end", .. })
        ));
    }

    #[test]
    fn resolver_uses_explicit_bounds_and_local_offset_for_naive_values() {
        let resolver = WindowResolver::new(7, kst());
        let now = ts("2030-01-01T00:00:00Z");
        let window = resolver
            .resolve(Some("2025-08-18T00:00:00"), Some("2025-08-25T00:00:00+09:00"), now)
            .unwrap();
        assert_eq!(window.start, ts("2025-08-17T15:00:00Z"));
        assert_eq!(window.end, ts("2025-08-24T15:00:00Z"));
    }

    #[test]
    fn resolver_falls_back_when_a_bound_is_malformed() {
        let resolver = WindowResolver::new(7, kst());
        let now = ts("2030-01-01T00:00:00Z");

        let anchored = resolver
            .resolve(Some("yesterday"), Some("2025-08-25T00:00:00+09:00"), now)
            .unwrap();
        assert_eq!(anchored.start, ts("2025-08-17T15:00:00Z"));
        assert_eq!(anchored.end, ts("2025-08-24T15:00:00Z"));

        let unanchored = resolver
            .resolve(Some("2025-08-18T00:00:00+09:00"), Some("next week"), now)
            .unwrap();
        assert_eq!(unanchored, resolver.default_window(now));
    }

    #[test]
    fn offset_timestamps_without_seconds_or_colon_are_accepted() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let expected = ts("2025-08-17T15:00:00Z");
        for raw in [
            "2025-08-18T00:00:00+09:00",
            "2025-08-18T00:00+09:00",
            "2025-08-18T00:00:00+0900",
            "2025-08-18T00:00+0900",
            "2025-08-18T00:00:00.000+0900",
            "2025-08-18 00:00:00+09:00",
        ] {
            assert_eq!(parse_timestamp(raw, utc), Some(expected), "{raw}");
        }

        let resolver = WindowResolver::new(7, kst());
        let window = resolver
            .resolve(
                Some("2025-08-18T00:00+09:00"),
                Some("2025-08-25T00:00+09:00"),
                ts("2030-01-01T00:00:00Z"),
            )
            .unwrap();
        assert_eq!(window.start, expected);
        assert_eq!(window.end, ts("2025-08-24T15:00:00Z"));
    }

    #[test]
    fn oversized_trailing_window_saturates() {
        let now = ts("2025-08-25T00:00:00Z");
        let window = Window::trailing(now, i64::MAX);
        assert_eq!(window.start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(window.end, now);
        assert!(window.contains(ts("1970-01-01T00:00:00Z")));
    }

    #[test]
    fn resolver_rejects_inverted_windows() {
        let resolver = WindowResolver::new(7, kst());
        let now = ts("2025-08-25T00:00:00Z");
        assert!(matches!(
            resolver.resolve(Some("2025-08-25"), Some("2025-08-18"), now),
            Err(WindowError::Empty { .. })
        ));
    }

    #[test]
    fn window_is_half_open() {
        let window = Window::new(ts("2025-01-01T00:00:00Z"), ts("2025-01-08T00:00:00Z")).unwrap();
        assert!(window.contains(ts("2025-01-01T00:00:00Z")));
        assert!(window.contains(ts("2025-01-07T23:59:59Z")));
        assert!(!window.contains(ts("2025-01-08T00:00:00Z")));
    }

    #[test]
    fn utc_offset_parsing() {
        assert_eq!(parse_utc_offset("+09:00"), Some(kst()));
        assert_eq!(parse_utc_offset("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("nine"), None);
    }

    #[test]
    fn same_day_visits_count_once_in_local_time() {
        let a = addr("Seoul", "Mapo-gu", "Seogyo-dong");
        let signals = ProposerSignals {
            visits: vec![
                visit("2025-01-02T01:00:00Z", &a),
                visit("2025-01-02T09:00:00Z", &a),
                // 2025-01-03 00:30 at +09:00, same local day as the next record
                visit("2025-01-02T15:30:00Z", &a),
                visit("2025-01-03T02:00:00Z", &a),
            ],
            ..Default::default()
        };
        let regions = signals.candidate_regions();
        let out = signals.region_stats(&regions, kst());
        let key = canonicalize(&a).unwrap();
        assert_eq!(out[&key], stats(2, 0, 0, 0));
    }

    #[test]
    fn incomplete_addresses_never_become_candidates() {
        let signals = ProposerSignals {
            proposals: vec![
                ActivitySignal::new(json!({ "sido": "Seoul", "sigungu": "Mapo-gu" })),
                ActivitySignal::new(JsonValue::Null),
            ],
            likes: vec![ActivitySignal::new(addr("Busan", "Haeundae-gu", "U-dong"))],
            ..Default::default()
        };
        let regions = signals.candidate_regions();
        assert_eq!(regions.len(), 1);
        let out = signals.region_stats(&regions, kst());
        assert_eq!(out.values().next(), Some(&stats(0, 1, 0, 0)));
    }

    #[test]
    fn stats_are_scoped_per_region() {
        let a = addr("Seoul", "Mapo-gu", "Seogyo-dong");
        let b = addr("Seoul", "Mapo-gu", "Hapjeong-dong");
        let signals = ProposerSignals {
            proposals: vec![ActivitySignal::new(a.clone()), ActivitySignal::new(b.clone())],
            likes: vec![ActivitySignal::new(a.clone()), ActivitySignal::new(a.clone())],
            fundings: vec![ActivitySignal::new(b.clone())],
            ..Default::default()
        };
        let out = signals.region_stats(&signals.candidate_regions(), kst());
        assert_eq!(out[&canonicalize(&a).unwrap()], stats(0, 2, 1, 0));
        assert_eq!(out[&canonicalize(&b).unwrap()], stats(0, 0, 1, 1));
    }

    #[test]
    fn default_weights_sum_to_total() {
        assert_eq!(ScoreConfig::default_weights().total(), WEIGHT_TOTAL);
        assert!(ScoreConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_scoring_configs_are_rejected() {
        let mut config = ScoreConfig::default();
        config.weights.likes = 25;
        assert_eq!(
            ScoreCalculator::new(config).unwrap_err(),
            ScoringConfigError::WeightSum(105)
        );

        let mut config = ScoreConfig::default();
        config.caps.fundings = 0;
        assert_eq!(
            ScoreCalculator::new(config).unwrap_err(),
            ScoringConfigError::ZeroCap("fundings")
        );
    }

    #[test]
    fn worked_score_examples() {
        let calc = ScoreCalculator::default();
        assert_eq!(calc.score(&stats(2, 0, 0, 0)), 11);
        assert_eq!(calc.score(&stats(7, 10, 5, 3)), 100);
        assert_eq!(calc.score(&stats(3, 5, 0, 0)), 27);
        assert_eq!(calc.score(&stats(5, 8, 2, 1)), 59);
        assert_eq!(calc.score(&RegionStats::default()), 0);
    }

    #[test]
    fn caps_clamp_without_changing_the_score() {
        let calc = ScoreCalculator::default();
        assert_eq!(calc.score(&stats(7, 10, 5, 3)), calc.score(&stats(70, 1000, 6, 4)));
        assert_eq!(calc.score(&stats(0, 10, 0, 0)), calc.score(&stats(0, 11, 0, 0)));
    }

    #[test]
    fn score_is_monotonic_in_each_metric() {
        let calc = ScoreCalculator::default();
        let base = stats(2, 3, 1, 1);
        for metric in Metric::ALL {
            let mut prev = calc.score(&base);
            let mut current = base;
            for _ in 0..12 {
                current.bump(metric);
                let next = calc.score(&current);
                assert!(next >= prev, "{} decreased the score", metric.as_str());
                prev = next;
            }
        }
    }

    #[test]
    fn level_thresholds() {
        assert_eq!(level_of(0), Level::One);
        assert_eq!(level_of(29), Level::One);
        assert_eq!(level_of(30), Level::Two);
        assert_eq!(level_of(59), Level::Two);
        assert_eq!(level_of(60), Level::Three);
        assert_eq!(level_of(100), Level::Three);
    }

    #[test]
    fn stored_levels_outside_range_are_rejected() {
        assert_eq!(Level::try_from(2i16), Ok(Level::Two));
        assert_eq!(Level::try_from(0i16), Err(InvalidLevel(0)));
        assert!(serde_json::from_value::<Level>(json!(4)).is_err());
        assert_eq!(serde_json::to_value(Level::Three).unwrap(), json!(3));
    }
}
