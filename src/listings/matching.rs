use crate::db::models::{Listing, TenantPreferences};

pub const RENT_WEIGHT: u32 = 40;
pub const BEDROOMS_WEIGHT: u32 = 25;
pub const TYPE_WEIGHT: u32 = 20;
pub const LOCATION_WEIGHT: u32 = 15;

pub const MAX_RECOMMENDATIONS: usize = 20;

/// Score a listing against a tenant's preferences, 0..=100.
/// Unset preference fields contribute nothing.
pub fn score(listing: &Listing, prefs: &TenantPreferences) -> u32 {
    let mut score = 0;

    if let Some(max_rent) = prefs.max_rent {
        if listing.price <= max_rent {
            score += RENT_WEIGHT;
        }
    }
    if let Some(min_bedrooms) = prefs.min_bedrooms {
        if listing.bedrooms >= min_bedrooms {
            score += BEDROOMS_WEIGHT;
        }
    }
    if let Some(ref kind) = prefs.property_type {
        if listing.property_type.eq_ignore_ascii_case(kind.trim()) {
            score += TYPE_WEIGHT;
        }
    }
    if let Some(location) = prefs.location.as_deref().map(str::trim) {
        if !location.is_empty()
            && listing
                .location
                .to_lowercase()
                .contains(&location.to_lowercase())
        {
            score += LOCATION_WEIGHT;
        }
    }

    score
}

/// Rank candidates by score, highest first. `candidates` must already be
/// newest first; the sort is stable so recency breaks ties.
pub fn rank(candidates: Vec<Listing>, prefs: &TenantPreferences) -> Vec<(Listing, u32)> {
    let mut scored: Vec<(Listing, u32)> = candidates
        .into_iter()
        .map(|l| {
            let s = score(&l, prefs);
            (l, s)
        })
        .filter(|(_, s)| *s > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(MAX_RECOMMENDATIONS);
    scored
}
