use crate::schedule::BlockedSet;

/// Result of comparing a fresh blocked set with the announced one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The set differs from the last announced one and is now announced
    Changed(BlockedSet),
    /// Same as last time; downstream work can be skipped
    Unchanged,
}

/// Suppresses repeated announcements of the same blocked set
///
/// Comparison is string-exact on `BlockedSet::canonical`, not set equality.
/// Because the canonical form is sorted and de-duplicated the two agree for
/// sets built by this crate.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    announced: Option<(String, BlockedSet)>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `set` with the announced state; the first call always reports a change
    pub fn observe(&mut self, set: BlockedSet) -> Observation {
        let canonical = set.canonical();

        if let Some((previous, _)) = &self.announced {
            if *previous == canonical {
                return Observation::Unchanged;
            }
        }

        self.announced = Some((canonical, set.clone()));
        Observation::Changed(set)
    }

    /// Last announced set, if any
    #[cfg(test)]
    pub fn announced(&self) -> Option<&BlockedSet> {
        self.announced.as_ref().map(|(_, set)| set)
    }

    /// Forget the announced state
    pub fn reset(&mut self) {
        self.announced = None;
    }
}
