use crate::error::ScrapeError;

/// Counters read off the drop tracker for one aggregation window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DropCountSample {
    pub trials: u64,
    pub blue_chest_count: u64, // <= trials
    pub hihi_count: u64,       // <= blue_chest_count
}

impl DropCountSample {
    pub fn new(trials: u64, blue_chest_count: u64, hihi_count: u64) -> Result<Self, ScrapeError> {
        if blue_chest_count > trials || hihi_count > blue_chest_count {
            return Err(ScrapeError::Inconsistent {
                trials,
                blue_chest: blue_chest_count,
                hihi: hihi_count,
            });
        }
        Ok(Self { trials, blue_chest_count, hihi_count })
    }
}

/// Both windows, scraped from the same page under different filter state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DropData {
    pub cumulative: DropCountSample,
    pub monthly: DropCountSample,
}

/// Which window the tracker is showing. The label is the option text on the site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Cumulative,
    Monthly,
}

impl Aggregate {
    pub fn site_label(self) -> &'static str {
        match self {
            Aggregate::Cumulative => "累計",
            Aggregate::Monthly => "月",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Cumulative => "cumulative",
            Aggregate::Monthly => "monthly",
        }
    }
}

/// One row of the guild roster. `name` is the key on the sheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub rank: String,
}

impl Member {
    pub fn new(name: &str, rank: &str) -> Self {
        Self { name: name.trim().to_string(), rank: rank.trim().to_string() }
    }
}
