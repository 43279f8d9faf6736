use std::collections::HashSet;

use indexmap::IndexMap;

/// Outcome of offering one candidate to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// `max_results` was already reached
    Full,
    /// The build already contributed a result
    DuplicateBuild,
}

/// Bounded, arrival-ordered collection of results.
///
/// Reports through [`ResultAccumulator::is_satisfied`] when `auto` fetching can
/// stop: `max_results` reached, every targeted key reached its sample count, or
/// the build ceiling was reached.
#[derive(Debug)]
pub struct ResultAccumulator<T> {
    items: Vec<T>,
    max_results: Option<usize>,
    one_per_build: bool,
    builds_with_result: HashSet<u64>,
    builds_seen: usize,
    max_builds: Option<usize>,
    sample_target: Option<usize>,
    samples_per_key: IndexMap<String, usize>,
}

impl<T> Default for ResultAccumulator<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            max_results: None,
            one_per_build: false,
            builds_with_result: HashSet::new(),
            builds_seen: 0,
            max_builds: None,
            sample_target: None,
            samples_per_key: IndexMap::new(),
        }
    }
}

impl<T> ResultAccumulator<T> {
    pub fn new(max_results: Option<usize>) -> Self {
        Self {
            max_results,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn one_result_per_build(mut self, enabled: bool) -> Self {
        self.one_per_build = enabled;
        self
    }

    #[must_use]
    pub fn with_build_ceiling(mut self, max_builds: Option<usize>) -> Self {
        self.max_builds = max_builds;
        self
    }

    /// Satisfied once every key has at least `samples` accepted results.
    #[must_use]
    pub fn with_sample_target(mut self, keys: &[String], samples: Option<usize>) -> Self {
        self.sample_target = samples;
        self.samples_per_key = keys.iter().map(|k| (k.clone(), 0)).collect();
        self
    }

    /// Records that a build passed the build-level filters.
    pub fn note_build(&mut self) {
        self.builds_seen += 1;
    }

    /// Offers a result produced by `build_number`, grouped under `key` for the
    /// per-key sample target.
    pub fn offer(&mut self, build_number: u64, key: Option<&str>, item: T) -> Offer {
        if self.is_full() {
            return Offer::Full;
        }
        if self.one_per_build && self.builds_with_result.contains(&build_number) {
            return Offer::DuplicateBuild;
        }

        self.builds_with_result.insert(build_number);
        if let Some(count) = key.and_then(|k| self.samples_per_key.get_mut(k)) {
            *count += 1;
        }
        self.items.push(item);
        Offer::Accepted
    }

    pub fn is_full(&self) -> bool {
        self.max_results.is_some_and(|max| self.items.len() >= max)
    }

    pub fn is_satisfied(&self) -> bool {
        if self.is_full() {
            return true;
        }
        if self.max_builds.is_some_and(|max| self.builds_seen >= max) {
            return true;
        }
        match self.sample_target {
            Some(target) if !self.samples_per_key.is_empty() => {
                self.samples_per_key.values().all(|&count| count >= target)
            }
            _ => false,
        }
    }

    pub fn would_accept(&self, build_number: u64) -> bool {
        !self.is_full() && !(self.one_per_build && self.builds_with_result.contains(&build_number))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn builds_seen(&self) -> usize {
        self.builds_seen
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}
