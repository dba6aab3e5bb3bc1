use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Display, str::FromStr};

use super::MovieId;
use crate::error::AppError;

/// ISO 3166-1 alpha-2 country code, always uppercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CountryCode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(CountryCode(code.to_ascii_uppercase()))
        } else {
            Err(AppError::InvalidInput(format!(
                "Invalid country code: {}",
                s
            )))
        }
    }
}

impl TryFrom<String> for CountryCode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a provider offers a movie
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferType {
    Buy,
    Flatrate,
    Rent,
}

/// A provider entry for one country after merging offer types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchProvider {
    pub provider_id: i32,
    pub provider_name: String,
    pub logo_path: Option<String>,
    pub display_priority: Option<i32>,
    /// Sorted, deduplicated
    pub offer_types: Vec<OfferType>,
}

// ============================================================================
// TMDB Watch Provider Types
// ============================================================================

/// Response of `/movie/{id}/watch/providers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchProvidersResponse {
    pub id: MovieId,
    #[serde(default)]
    pub results: HashMap<String, CountryWatchProviders>,
}

/// Offers for a single country
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryWatchProviders {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub flatrate: Option<Vec<ProviderOffer>>,
    #[serde(default)]
    pub rent: Option<Vec<ProviderOffer>>,
    #[serde(default)]
    pub buy: Option<Vec<ProviderOffer>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOffer {
    pub provider_id: i32,
    pub provider_name: String,
    #[serde(default)]
    pub logo_path: Option<String>,
    #[serde(default)]
    pub display_priority: Option<i32>,
}

impl CountryWatchProviders {
    /// Flattens the per-offer lists into one list ordered by display priority
    /// (entries without a priority last), merging entries of the same
    /// provider into one with the union of its offer types.
    ///
    /// A merged entry keeps the position of the provider's first occurrence
    /// and takes the remaining fields from its last occurrence.
    pub fn merged(self) -> Vec<WatchProvider> {
        let mut flattened: Vec<(ProviderOffer, OfferType)> = [
            (self.flatrate, OfferType::Flatrate),
            (self.rent, OfferType::Rent),
            (self.buy, OfferType::Buy),
        ]
        .into_iter()
        .flat_map(|(providers, offer_type)| {
            providers
                .unwrap_or_default()
                .into_iter()
                .map(move |provider| (provider, offer_type))
        })
        .collect();

        flattened.sort_by_key(|(provider, _)| provider.display_priority.unwrap_or(i32::MAX));

        let mut merged: Vec<WatchProvider> = Vec::new();
        for (provider, offer_type) in flattened {
            match merged
                .iter_mut()
                .find(|p| p.provider_id == provider.provider_id)
            {
                Some(existing) => {
                    existing.provider_name = provider.provider_name;
                    existing.logo_path = provider.logo_path;
                    existing.display_priority = provider.display_priority;
                    if !existing.offer_types.contains(&offer_type) {
                        existing.offer_types.push(offer_type);
                        existing.offer_types.sort();
                    }
                }
                None => merged.push(WatchProvider {
                    provider_id: provider.provider_id,
                    provider_name: provider.provider_name,
                    logo_path: provider.logo_path,
                    display_priority: provider.display_priority,
                    offer_types: vec![offer_type],
                }),
            }
        }

        merged
    }
}
