use std::collections::BTreeMap;

/// Per-country record tally accumulated over a whole run.
///
/// Owned by the split pipeline and handed to the report generator once
/// processing completes. Countries are kept sorted so reports and logs
/// are deterministic.
#[derive(Debug, Default)]
pub struct RunStats {
    counts: BTreeMap<String, u64>,
    total: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one record for the given country.
    pub fn record(&mut self, country: &str) {
        self.add(country, 1);
    }

    /// Adds `n` records for the given country.
    pub fn add(&mut self, country: &str, n: u64) {
        *self.counts.entry(country.to_string()).or_insert(0) += n;
        self.total += n;
    }

    pub fn count_for(&self, country: &str) -> u64 {
        self.counts.get(country).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn country_count(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::RunStats;

    #[test]
    fn record_accumulates_per_country_and_total() {
        let mut stats = RunStats::new();
        stats.record("NO");
        stats.record("NO");
        stats.record("BE");

        assert_eq!(stats.count_for("NO"), 2);
        assert_eq!(stats.count_for("BE"), 1);
        assert_eq!(stats.count_for("SE"), 0);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.country_count(), 2);
    }

    #[test]
    fn add_counts_in_bulk() {
        let mut stats = RunStats::new();
        stats.add("DK", 41);
        stats.record("DK");
        assert_eq!(stats.count_for("DK"), 42);
        assert_eq!(stats.total(), 42);
    }

    #[test]
    fn counts_are_sorted_by_country() {
        let mut stats = RunStats::new();
        stats.record("SE");
        stats.record("BE");
        stats.record("NO");

        let countries: Vec<&String> = stats.counts().keys().collect();
        assert_eq!(countries, ["BE", "NO", "SE"]);
    }
}
