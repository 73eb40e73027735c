//! `universe_cache.json` — exactly one valid [`UniverseSelection`] per
//! trading date (spec §3, §6 "Persisted state layout").

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use kte_domain::UniverseSelection;

use crate::atomic_file::{read_json, write_json_atomic};

pub struct UniverseCache {
    path: PathBuf,
}

impl UniverseCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        UniverseCache { path: path.into() }
    }

    /// Returns the cached selection only if it matches `date`; a stale
    /// selection from a prior day is treated as absent.
    pub fn load_for_date(&self, date: NaiveDate) -> Result<Option<UniverseSelection>> {
        let cached: Option<UniverseSelection> = read_json(&self.path)?;
        Ok(cached.filter(|sel| sel.is_valid_for(date)))
    }

    pub fn save(&self, selection: &UniverseSelection) -> Result<()> {
        write_json_atomic(&self.path, selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kte_domain::SelectionMethod;

    #[test]
    fn stale_cache_from_prior_day_is_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UniverseCache::new(dir.path().join("universe_cache.json"));
        let d1 = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 7, 21).unwrap();
        let sel = UniverseSelection::new(d1, SelectionMethod::Fixed, vec![], chrono::Utc::now());
        cache.save(&sel).unwrap();
        assert!(cache.load_for_date(d1).unwrap().is_some());
        assert!(cache.load_for_date(d2).unwrap().is_none());
    }
}
