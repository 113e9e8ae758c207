//! District Catalog
//!
//! The fixed deck `request_cards` samples from. Costs are listed for clients;
//! building charges the flat `GameRules::build_cost` instead.

use serde::Serialize;

/// District category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistrictCategory {
    /// Yellow districts.
    Noble,
    /// Blue districts.
    Religious,
    /// Green districts.
    Trade,
    /// Red districts.
    Military,
    /// Purple districts.
    Unique,
}

/// A buildable district card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct District {
    /// Stable identifier carried in hands and built lists.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Category.
    pub category: DistrictCategory,
    /// Listed cost.
    pub cost: u32,
}

const fn district(
    id: &'static str,
    name: &'static str,
    category: DistrictCategory,
    cost: u32,
) -> District {
    District { id, name, category, cost }
}

/// Every district in the deck.
pub const DISTRICTS: &[District] = &[
    district("manor", "Manor", DistrictCategory::Noble, 3),
    district("castle", "Castle", DistrictCategory::Noble, 4),
    district("palace", "Palace", DistrictCategory::Noble, 5),
    district("temple", "Temple", DistrictCategory::Religious, 1),
    district("church", "Church", DistrictCategory::Religious, 2),
    district("monastery", "Monastery", DistrictCategory::Religious, 3),
    district("cathedral", "Cathedral", DistrictCategory::Religious, 5),
    district("tavern", "Tavern", DistrictCategory::Trade, 1),
    district("market", "Market", DistrictCategory::Trade, 2),
    district("trading_post", "Trading Post", DistrictCategory::Trade, 2),
    district("docks", "Docks", DistrictCategory::Trade, 3),
    district("harbor", "Harbor", DistrictCategory::Trade, 4),
    district("town_hall", "Town Hall", DistrictCategory::Trade, 5),
    district("watchtower", "Watchtower", DistrictCategory::Military, 1),
    district("prison", "Prison", DistrictCategory::Military, 2),
    district("barracks", "Barracks", DistrictCategory::Military, 3),
    district("fortress", "Fortress", DistrictCategory::Military, 5),
    district("laboratory", "Laboratory", DistrictCategory::Unique, 5),
    district("smithy", "Smithy", DistrictCategory::Unique, 5),
    district("observatory", "Observatory", DistrictCategory::Unique, 4),
    district("library", "Library", DistrictCategory::Unique, 6),
    district("keep", "Keep", DistrictCategory::Unique, 3),
];

/// Look up a district by id.
pub fn find_district(id: &str) -> Option<&'static District> {
    DISTRICTS.iter().find(|d| d.id == id)
}

/// All district ids, in catalog order.
pub fn district_ids() -> Vec<String> {
    DISTRICTS.iter().map(|d| d.id.to_string()).collect()
}
