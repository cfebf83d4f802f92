//! Ordered (ingredient, vendor) pairs for one refresh pass.

use crate::data::models::{Ingredient, Vendor};

/// One unit of work for the refresh loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ingredient: Ingredient,
    pub vendor: Vendor,
}

/// Cross product of ingredients and vendors, ingredient-major.
///
/// Both sides are sorted by case-insensitive name with the id as tie-breaker,
/// so two runs over the same catalog visit pairs in the same order regardless
/// of how the rows were fetched.
pub fn enumerate(mut ingredients: Vec<Ingredient>, mut vendors: Vec<Vendor>) -> Vec<Candidate> {
    ingredients.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then(a.id.cmp(&b.id))
    });
    vendors.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then(a.id.cmp(&b.id))
    });

    ingredients
        .iter()
        .flat_map(|ingredient| {
            vendors.iter().map(move |vendor| Candidate {
                ingredient: ingredient.clone(),
                vendor: vendor.clone(),
            })
        })
        .collect()
}
