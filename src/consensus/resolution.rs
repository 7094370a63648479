use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

/// The outcome of picking a visit date from the voters' availability.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every voter can make this date, and it is the earliest such date.
    Common(NaiveDate),
    /// No date suits everyone; this one suits the most voters.
    MostPopular(NaiveDate),
    /// Nobody offered any date at all.
    NoDates,
}

impl Resolution {
    /// Pick a date from each voter's set of available dates.
    ///
    /// The earliest date present in every set wins. Failing that, the date
    /// present in the most sets wins, earliest first on ties.
    pub fn resolve<'a>(availabilities: impl IntoIterator<Item = &'a BTreeSet<NaiveDate>>) -> Self {
        let mut sets = 0;
        let mut counts = BTreeMap::<NaiveDate, usize>::new();
        for dates in availabilities {
            sets += 1;
            for date in dates {
                *counts.entry(*date).or_default() += 1;
            }
        }

        // Iteration is in date order, so only a strictly greater count
        // displaces an earlier date.
        let mut best: Option<(NaiveDate, usize)> = None;
        for (date, count) in counts {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((date, count));
            }
        }

        match best {
            Some((date, count)) if count == sets => Self::Common(date),
            Some((date, _)) => Self::MostPopular(date),
            None => Self::NoDates,
        }
    }

    /// The date to lock, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Common(date) | Self::MostPopular(date) => Some(*date),
            Self::NoDates => None,
        }
    }
}
