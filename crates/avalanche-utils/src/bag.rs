//! Multiset with threshold tracking.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// A multiset that counts how many times each element was added.
///
/// A bag can also track which elements reached a threshold count, which is
/// how frontier votes and poll tallies are read back.
///
/// ```
/// use avalanche_utils::Bag;
///
/// let mut votes = Bag::new();
/// votes.set_threshold(2);
/// votes.add("x");
/// votes.add_count("x", 1);
/// votes.add("y");
///
/// assert_eq!(votes.count(&"x"), 2);
/// assert_eq!(votes.len(), 3);
/// assert!(votes.threshold().contains(&"x"));
/// assert!(!votes.threshold().contains(&"y"));
/// ```
#[derive(Clone)]
pub struct Bag<T: Eq + Hash + Clone> {
    counts: HashMap<T, usize>,
    size: usize,
    threshold: usize,
    met_threshold: HashSet<T>,
}

impl<T: Eq + Hash + Clone> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Bag<T> {
    /// Creates an empty bag with no threshold.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            size: 0,
            threshold: 0,
            met_threshold: HashSet::new(),
        }
    }

    /// Creates a bag holding every element yielded by `iter`.
    pub fn of<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut bag = Self::new();
        for item in iter {
            bag.add(item);
        }
        bag
    }

    /// Sets the count at which an element enters [`Bag::threshold`].
    ///
    /// A threshold of zero disables tracking.
    pub fn set_threshold(&mut self, threshold: usize) {
        if self.threshold == threshold {
            return;
        }
        self.threshold = threshold;
        self.met_threshold.clear();
        if threshold == 0 {
            return;
        }
        for (item, &count) in &self.counts {
            if count >= threshold {
                self.met_threshold.insert(item.clone());
            }
        }
    }

    pub fn add(&mut self, item: T) {
        self.add_count(item, 1);
    }

    /// Adds `count` copies of `item`. A zero count is a no-op.
    pub fn add_count(&mut self, item: T, count: usize) {
        if count == 0 {
            return;
        }
        let total = self.counts.entry(item.clone()).or_insert(0);
        *total += count;
        self.size += count;
        if self.threshold > 0 && *total >= self.threshold {
            self.met_threshold.insert(item);
        }
    }

    /// Returns how many copies of `item` the bag holds.
    #[must_use]
    pub fn count(&self, item: &T) -> usize {
        self.counts.get(item).copied().unwrap_or(0)
    }

    /// Returns the total number of elements, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the distinct elements in arbitrary order.
    pub fn list(&self) -> Vec<T> {
        self.counts.keys().cloned().collect()
    }

    /// Iterates over `(element, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&T, usize)> {
        self.counts.iter().map(|(item, &count)| (item, count))
    }

    /// Returns the most common element and its count. Ties are broken
    /// arbitrarily.
    pub fn mode(&self) -> Option<(T, usize)> {
        self.counts
            .iter()
            .max_by_key(|(_, &count)| count)
            .map(|(item, &count)| (item.clone(), count))
    }

    /// Returns the elements whose count reached the threshold.
    #[must_use]
    pub fn threshold(&self) -> &HashSet<T> {
        &self.met_threshold
    }

    /// Removes every copy of `item`, returning how many were held.
    pub fn remove(&mut self, item: &T) -> usize {
        match self.counts.remove(item) {
            Some(count) => {
                self.size -= count;
                self.met_threshold.remove(item);
                count
            }
            None => 0,
        }
    }
}

impl<T: Eq + Hash + Clone> PartialEq for Bag<T> {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.counts == other.counts
    }
}

impl<T: Eq + Hash + Clone> Eq for Bag<T> {}

impl<T: Eq + Hash + Clone> FromIterator<T> for Bag<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::of(iter)
    }
}

impl<T: Eq + Hash + Clone + fmt::Debug> fmt::Debug for Bag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.counts.iter()).finish()
    }
}

impl<T: Eq + Hash + Clone + fmt::Display> fmt::Display for Bag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bag[size={}]", self.size)?;
        for (item, count) in &self.counts {
            write!(f, "\n    {item}: {count}")?;
        }
        Ok(())
    }
}
