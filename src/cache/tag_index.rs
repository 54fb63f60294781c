//! Immutable tag search/popularity snapshot.

use std::collections::BTreeMap;

use crate::domain::entities::TagUsage;

/// Tags ordered by usage descending, then name ascending.
///
/// A snapshot is never mutated after construction; updates produce a new
/// index with a higher generation.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    entries: Vec<TagUsage>,
    generation: u64,
}

fn ranked(counts: BTreeMap<String, u64>) -> Vec<TagUsage> {
    let mut entries: Vec<TagUsage> = counts
        .into_iter()
        .map(|(name, usage_count)| TagUsage { name, usage_count })
        .collect();
    // BTreeMap yields names ascending; a stable sort keeps that as the tie-break.
    entries.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
    entries
}

impl TagIndex {
    pub fn build(usages: impl IntoIterator<Item = TagUsage>, generation: u64) -> Self {
        let counts = usages
            .into_iter()
            .map(|usage| (usage.name, usage.usage_count))
            .collect();
        Self {
            entries: ranked(counts),
            generation,
        }
    }

    /// Copy of this index with `updates` applied, one generation later.
    pub fn with_updates(&self, updates: &[TagUsage]) -> Self {
        let mut counts: BTreeMap<String, u64> = self
            .entries
            .iter()
            .map(|usage| (usage.name.clone(), usage.usage_count))
            .collect();
        for update in updates {
            counts.insert(update.name.clone(), update.usage_count);
        }
        Self {
            entries: ranked(counts),
            generation: self.generation + 1,
        }
    }

    /// 0 for an index that was never loaded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive substring search over tags still in use. Prefix
    /// matches come first; each group keeps the popularity order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<String> {
        let trimmed = query.trim();
        let needle = trimmed.strip_prefix('#').unwrap_or(trimmed).to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let (prefix, inner): (Vec<&TagUsage>, Vec<&TagUsage>) = self
            .entries
            .iter()
            .filter(|usage| usage.usage_count > 0 && usage.name.contains(&needle))
            .partition(|usage| usage.name.starts_with(&needle));

        prefix
            .into_iter()
            .chain(inner)
            .take(limit)
            .map(|usage| usage.name.clone())
            .collect()
    }

    /// Top `limit` tags still in use.
    pub fn popular(&self, limit: usize) -> Vec<TagUsage> {
        self.entries
            .iter()
            .filter(|usage| usage.usage_count > 0)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(name: &str, usage_count: u64) -> TagUsage {
        TagUsage {
            name: name.to_string(),
            usage_count,
        }
    }

    fn sample() -> TagIndex {
        TagIndex::build(
            [
                usage("rust", 10),
                usage("react", 10),
                usage("frontend", 3),
                usage("career", 7),
                usage("unused", 0),
            ],
            1,
        )
    }

    #[test]
    fn popular_orders_by_usage_then_name() {
        let names: Vec<_> = sample()
            .popular(10)
            .into_iter()
            .map(|usage| usage.name)
            .collect();
        assert_eq!(names, vec!["react", "rust", "career", "frontend"]);
        assert_eq!(sample().popular(2).len(), 2);
        assert!(sample().popular(0).is_empty());
    }

    #[test]
    fn search_ranks_prefix_matches_first() {
        let index = sample();
        assert_eq!(index.search("RE", 10), vec!["react", "career"]);
        assert_eq!(index.search("#r", 10), vec!["react", "rust", "career", "frontend"]);
        assert_eq!(index.search("r", 1), vec!["react"]);
        assert!(index.search("   ", 10).is_empty());
        assert!(index.search("zzz", 10).is_empty());
    }

    #[test]
    fn search_skips_unused_tags() {
        let index = sample();
        assert!(index.search("unused", 10).is_empty());
        assert_eq!(index.search("u", 10), vec!["rust"]);
    }

    #[test]
    fn updates_produce_a_new_generation() {
        let index = sample();
        let next = index.with_updates(&[usage("frontend", 11), usage("wasm", 1)]);

        assert_eq!(index.generation(), 1);
        assert_eq!(next.generation(), 2);
        assert_eq!(index.popular(1)[0].name, "react");
        assert_eq!(next.popular(1)[0].name, "frontend");
        assert_eq!(next.len(), index.len() + 1);
    }

    #[test]
    fn build_keeps_last_duplicate() {
        let index = TagIndex::build([usage("go", 1), usage("go", 4)], 1);
        assert_eq!(index.popular(5), vec![usage("go", 4)]);
    }
}
