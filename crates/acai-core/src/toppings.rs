//! # Free-Topping Allowances
//!
//! Turns the buyer's topping selections on the product page into a priced
//! [`Customization`].
//!
//! ## How Allowances Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Size "500ml", category "frutas", limit 2                               │
//! │                                                                         │
//! │  Selected:  morango ×2 (R$ 2,00)   kiwi ×1 (R$ 3,00)                    │
//! │                                                                         │
//! │  Units sorted by price, cheapest first:                                 │
//! │     morango  morango  kiwi                                              │
//! │     ───────  ───────  ────                                              │
//! │      free     free    paid                                              │
//! │                                                                         │
//! │  Result:  morango:free ×2 (R$ 0)   kiwi ×1 (R$ 3,00)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Limits come from configuration, per size and category. Categories in
//! `never_free` (paid extras) never get an allowance whatever the limits say.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Customization, SelectedTopping};
use crate::validation::{normalize_note, ValidationResult};

/// Category that is paid per unit unless configured otherwise.
pub const DEFAULT_NEVER_FREE_CATEGORY: &str = "extras";

/// Suffix of the id given to the free instance of a topping.
pub const FREE_ID_SUFFIX: &str = ":free";

// =============================================================================
// Policy
// =============================================================================

/// Free units of one category for one size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceLimit {
    pub size: String,
    pub category: String,
    pub limit: u32,
}

/// Free-topping allowance per (size, category).
///
/// ## Configuration
/// ```toml
/// [allowances]
/// never_free = ["extras"]
///
/// [[allowances.limits]]
/// size = "500ml"
/// category = "frutas"
/// limit = 2
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToppingAllowancePolicy {
    #[serde(default = "default_never_free")]
    pub never_free: BTreeSet<String>,

    #[serde(default)]
    pub limits: Vec<AllowanceLimit>,
}

fn default_never_free() -> BTreeSet<String> {
    BTreeSet::from([DEFAULT_NEVER_FREE_CATEGORY.to_string()])
}

impl Default for ToppingAllowancePolicy {
    fn default() -> Self {
        ToppingAllowancePolicy {
            never_free: default_never_free(),
            limits: Vec::new(),
        }
    }
}

impl ToppingAllowancePolicy {
    /// Adds a limit (builder style). A later limit for the same pair wins.
    pub fn with_limit(mut self, size: impl Into<String>, category: impl Into<String>, limit: u32) -> Self {
        self.limits.push(AllowanceLimit {
            size: size.into(),
            category: category.into(),
            limit,
        });
        self
    }

    /// Free units for a category at the given size.
    ///
    /// Zero when no size is selected, when the category is never free, or
    /// when nothing is configured for the pair.
    pub fn limit_for(&self, size_id: Option<&str>, category: &str) -> u32 {
        let Some(size_id) = size_id else {
            return 0;
        };
        if self.never_free.contains(category) {
            return 0;
        }
        self.limits
            .iter()
            .rev()
            .find(|l| l.size == size_id && l.category == category)
            .map_or(0, |l| l.limit)
    }

    /// Categories that grant free units at the given size, i.e. the ones the
    /// buyer must either pick from or skip.
    pub fn required_categories(&self, size_id: Option<&str>) -> BTreeSet<String> {
        self.limits
            .iter()
            .map(|l| l.category.as_str())
            .filter(|category| self.limit_for(size_id, category) > 0)
            .map(str::to_string)
            .collect()
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// A topping as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTopping {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub category: String,
}

/// How many units of a catalog topping the buyer picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToppingSelection {
    pub topping: CatalogTopping,
    pub quantity: u32,
}

/// Everything the product page collected for one line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationRequest {
    #[serde(default)]
    pub size_id: Option<String>,
    #[serde(default)]
    pub selections: Vec<ToppingSelection>,
    #[serde(default)]
    pub wants_cutlery: bool,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub skipped_categories: BTreeSet<String>,
}

// =============================================================================
// Builder
// =============================================================================

/// Builds the customization for a cart line, deciding which units are free.
///
/// ## Rules
/// 1. Selections of the same topping are merged; zero quantities dropped
/// 2. Selecting from a skipped category is rejected
/// 3. Per category, the cheapest units are free up to the size's limit
/// 4. Units are grouped per (topping, free-state); free groups get the id
///    `"<id>:free"` and keep the catalog id in `original_id`
/// 5. A category with a free allowance must be picked from or skipped
/// 6. The note is trimmed; empty means none; longer than 500 is rejected
///
/// ## Example
/// ```rust
/// use acai_core::money::Money;
/// use acai_core::toppings::*;
///
/// let policy = ToppingAllowancePolicy::default().with_limit("500ml", "frutas", 1);
/// let morango = CatalogTopping {
///     id: "morango".into(),
///     name: "Morango".into(),
///     price: Money::from_cents(200),
///     category: "frutas".into(),
/// };
/// let request = CustomizationRequest {
///     size_id: Some("500ml".into()),
///     selections: vec![ToppingSelection { topping: morango, quantity: 2 }],
///     ..Default::default()
/// };
///
/// let custom = build_customization(&request, &policy).unwrap();
/// assert_eq!(custom.toppings.len(), 2);
/// assert_eq!(custom.toppings[0].id, "morango:free");
/// assert_eq!(custom.toppings[1].id, "morango");
/// ```
pub fn build_customization(
    request: &CustomizationRequest,
    policy: &ToppingAllowancePolicy,
) -> ValidationResult<Customization> {
    let note = normalize_note(request.note.as_deref())?;
    let size_id = request.size_id.as_deref();

    // Merge by topping id, keeping first-seen order.
    let mut merged: Vec<ToppingSelection> = Vec::new();
    for selection in request.selections.iter().filter(|s| s.quantity > 0) {
        match merged.iter_mut().find(|m| m.topping.id == selection.topping.id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(selection.quantity)
                    .ok_or_else(|| ValidationError::OutOfRange {
                        field: format!("quantity of {}", selection.topping.id),
                        min: 1,
                        max: i64::from(u32::MAX),
                    })?;
            }
            None => merged.push(selection.clone()),
        }
    }

    let mut by_category: BTreeMap<&str, Vec<&ToppingSelection>> = BTreeMap::new();
    for selection in &merged {
        let category = selection.topping.category.as_str();
        if request.skipped_categories.contains(category) {
            return Err(ValidationError::SkippedCategorySelected {
                category: category.to_string(),
            });
        }
        by_category.entry(category).or_default().push(selection);
    }

    for category in policy.required_categories(size_id) {
        if !request.skipped_categories.contains(&category) && !by_category.contains_key(category.as_str()) {
            return Err(ValidationError::MissingCategorySelection { category });
        }
    }

    let mut toppings = Vec::new();
    for (category, mut selections) in by_category {
        // Stable: equal prices keep selection order.
        selections.sort_by_key(|s| s.topping.price);

        let mut free_remaining = policy.limit_for(size_id, category);
        for selection in selections {
            let topping = &selection.topping;
            let free_units = selection.quantity.min(free_remaining);
            let paid_units = selection.quantity - free_units;
            free_remaining -= free_units;

            if free_units > 0 {
                let mut free = SelectedTopping::free(
                    format!("{}{}", topping.id, FREE_ID_SUFFIX),
                    topping.name.clone(),
                    topping.price,
                    free_units,
                );
                free.original_id = Some(topping.id.clone());
                toppings.push(free);
            }
            if paid_units > 0 {
                toppings.push(SelectedTopping::paid(
                    topping.id.clone(),
                    topping.name.clone(),
                    topping.price,
                    paid_units,
                ));
            }
        }
    }

    Ok(Customization {
        size_id: request.size_id.clone(),
        toppings,
        wants_cutlery: request.wants_cutlery,
        note,
        skipped_categories: request.skipped_categories.clone(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn topping(id: &str, cents: i64, category: &str) -> CatalogTopping {
        CatalogTopping {
            id: id.to_string(),
            name: id.to_string(),
            price: Money::from_cents(cents),
            category: category.to_string(),
        }
    }

    fn pick(t: CatalogTopping, quantity: u32) -> ToppingSelection {
        ToppingSelection { topping: t, quantity }
    }

    fn policy() -> ToppingAllowancePolicy {
        ToppingAllowancePolicy::default()
            .with_limit("500ml", "frutas", 2)
            .with_limit("500ml", "cremes", 1)
            .with_limit("500ml", "extras", 5)
    }

    fn request(selections: Vec<ToppingSelection>) -> CustomizationRequest {
        CustomizationRequest {
            size_id: Some("500ml".to_string()),
            selections,
            skipped_categories: BTreeSet::from(["cremes".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_limit_lookup() {
        let policy = policy();
        assert_eq!(policy.limit_for(Some("500ml"), "frutas"), 2);
        assert_eq!(policy.limit_for(Some("300ml"), "frutas"), 0);
        assert_eq!(policy.limit_for(None, "frutas"), 0);
        // never-free wins over a configured limit
        assert_eq!(policy.limit_for(Some("500ml"), "extras"), 0);
    }

    #[test]
    fn test_cheapest_units_are_free() {
        let custom = build_customization(
            &request(vec![
                pick(topping("kiwi", 300, "frutas"), 1),
                pick(topping("morango", 200, "frutas"), 2),
            ]),
            &policy(),
        )
        .unwrap();

        assert_eq!(custom.toppings.len(), 2);
        assert_eq!(custom.toppings[0].id, "morango:free");
        assert_eq!(custom.toppings[0].quantity, 2);
        assert_eq!(custom.toppings[0].original_id.as_deref(), Some("morango"));
        assert!(custom.toppings[1].id == "kiwi" && !custom.toppings[1].is_free);
    }

    #[test]
    fn test_split_topping_into_free_and_paid_groups() {
        let custom = build_customization(
            &request(vec![pick(topping("banana", 150, "frutas"), 3)]),
            &policy(),
        )
        .unwrap();

        assert_eq!(custom.toppings.len(), 2);
        assert!(custom.toppings[0].is_free);
        assert_eq!(custom.toppings[0].quantity, 2);
        assert!(!custom.toppings[1].is_free);
        assert_eq!(custom.toppings[1].quantity, 1);
    }

    #[test]
    fn test_extras_are_always_paid() {
        let custom = build_customization(
            &request(vec![
                pick(topping("morango", 200, "frutas"), 1),
                pick(topping("nutella", 500, "extras"), 2),
            ]),
            &policy(),
        )
        .unwrap();

        let nutella = custom.toppings.iter().find(|t| t.catalog_id() == "nutella").unwrap();
        assert!(!nutella.is_free);
        assert_eq!(nutella.quantity, 2);
    }

    #[test]
    fn test_duplicate_selections_are_merged() {
        let custom = build_customization(
            &request(vec![
                pick(topping("morango", 200, "frutas"), 1),
                pick(topping("morango", 200, "frutas"), 1),
            ]),
            &policy(),
        )
        .unwrap();

        assert_eq!(custom.toppings.len(), 1);
        assert_eq!(custom.toppings[0].quantity, 2);
        assert!(custom.toppings[0].is_free);
    }

    #[test]
    fn test_merged_quantity_overflow_is_rejected() {
        let result = build_customization(
            &request(vec![
                pick(topping("morango", 200, "frutas"), u32::MAX),
                pick(topping("morango", 200, "frutas"), 1),
            ]),
            &policy(),
        );

        assert!(matches!(result, Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn test_missing_required_category() {
        let mut req = request(vec![pick(topping("nutella", 500, "extras"), 1)]);
        req.skipped_categories.clear();

        let err = build_customization(&req, &policy()).unwrap_err();
        // BTreeSet order: cremes before frutas
        assert_eq!(
            err,
            ValidationError::MissingCategorySelection {
                category: "cremes".to_string()
            }
        );
    }

    #[test]
    fn test_selection_from_skipped_category() {
        let err = build_customization(
            &request(vec![
                pick(topping("morango", 200, "frutas"), 1),
                pick(topping("ninho", 300, "cremes"), 1),
            ]),
            &policy(),
        )
        .unwrap_err();

        assert!(matches!(err, ValidationError::SkippedCategorySelected { .. }));
    }

    #[test]
    fn test_no_size_means_nothing_required_or_free() {
        let req = CustomizationRequest {
            selections: vec![pick(topping("morango", 200, "frutas"), 1)],
            ..Default::default()
        };
        let custom = build_customization(&req, &policy()).unwrap();
        assert!(!custom.toppings[0].is_free);
    }

    #[test]
    fn test_note_and_flags_carried_over() {
        let mut req = request(vec![pick(topping("morango", 200, "frutas"), 1)]);
        req.note = Some("  bem gelado  ".to_string());
        req.wants_cutlery = true;

        let custom = build_customization(&req, &policy()).unwrap();
        assert_eq!(custom.note.as_deref(), Some("bem gelado"));
        assert!(custom.wants_cutlery);
        assert_eq!(custom.size_id.as_deref(), Some("500ml"));
        assert!(custom.skipped_categories.contains("cremes"));
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: ToppingAllowancePolicy = serde_json::from_str(
            r#"{"limits":[{"size":"300ml","category":"frutas","limit":1}]}"#,
        )
        .unwrap();
        assert!(policy.never_free.contains("extras"));
        assert_eq!(policy.limit_for(Some("300ml"), "frutas"), 1);
    }
}
