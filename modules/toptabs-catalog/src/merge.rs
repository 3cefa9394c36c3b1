// Merge engine: folds partial observations from many listings into one
// record per canonical identifier.
//
// Field precedence:
//   hits          max of every value seen
//   rating/votes  latest present value wins, absence never clears
//   artist/song   first valid observation wins
//   category      fixed by the observation that created the record

use std::cmp::Ordering;
use std::collections::HashMap;

use toptabs_common::{Observation, Record};

/// What happened to a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    Created,
    Updated,
    /// Unseen identifier without both names. Dropped.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl MergeStats {
    fn record(&mut self, observed: Observed) {
        match observed {
            Observed::Created => self.created += 1,
            Observed::Updated => self.updated += 1,
            Observed::Skipped => self.skipped += 1,
        }
    }

    pub fn absorb(&mut self, other: MergeStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

impl std::fmt::Display for MergeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created={} updated={} skipped={}",
            self.created, self.updated, self.skipped
        )
    }
}

/// Working mapping of identifier → record for one merge run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    records: HashMap<String, Record>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a catalog from previously merged records.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        reconcile_records(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&Record> {
        self.records.get(url)
    }

    /// Fold one observation into the catalog.
    pub fn observe(&mut self, obs: Observation) -> Observed {
        if let Some(existing) = self.records.get_mut(&obs.url) {
            if let Some(hits) = obs.hits {
                existing.hits = existing.hits.max(hits);
            }
            if obs.rating.is_some() {
                existing.rating = obs.rating;
            }
            if obs.votes.is_some() {
                existing.votes = obs.votes;
            }
            return Observed::Updated;
        }

        let Some((artist, song)) = obs.identity() else {
            return Observed::Skipped;
        };

        let record = Record {
            artist: artist.to_string(),
            song: song.to_string(),
            category: Some(obs.category),
            url: obs.url.clone(),
            hits: obs.hits.unwrap_or(0),
            rating: obs.rating,
            votes: obs.votes,
        };
        self.records.insert(obs.url, record);
        Observed::Created
    }

    /// Fold observations in input order.
    pub fn merge<I>(&mut self, observations: I) -> MergeStats
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut stats = MergeStats::default();
        for obs in observations {
            stats.record(self.observe(obs));
        }
        stats
    }

    /// Records in persistence order.
    pub fn into_sorted(self) -> Vec<Record> {
        let mut rows: Vec<Record> = self.records.into_values().collect();
        sort_records(&mut rows);
        rows
    }
}

/// Whole-record dedup for independently produced files: per identifier the
/// record with strictly more hits wins, ties keep the first seen. Records
/// without an identifier are dropped.
pub fn reconcile_records<I>(records: I) -> Catalog
where
    I: IntoIterator<Item = Record>,
{
    let mut by_url: HashMap<String, Record> = HashMap::new();
    for record in records {
        if record.url.is_empty() {
            continue;
        }
        match by_url.get(&record.url) {
            Some(current) if record.hits <= current.hits => {}
            _ => {
                by_url.insert(record.url.clone(), record);
            }
        }
    }
    Catalog { records: by_url }
}

/// Category, hits descending, artist, song, then identifier.
pub fn sort_records(rows: &mut [Record]) {
    rows.sort_by(compare_records);
}

/// Rows without a category sort first.
fn category_key(record: &Record) -> &'static str {
    record.category.map(|c| c.as_str()).unwrap_or("")
}

fn compare_records(a: &Record, b: &Record) -> Ordering {
    category_key(a)
        .cmp(category_key(b))
        .then_with(|| b.hits.cmp(&a.hits))
        .then_with(|| a.artist.cmp(&b.artist))
        .then_with(|| a.song.cmp(&b.song))
        .then_with(|| a.url.cmp(&b.url))
}
