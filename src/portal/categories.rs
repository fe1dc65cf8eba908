//! Derived views over a course's items. Recomputed on every call.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::CourseItem;

/// Items grouped by category, categories in sorted order.
pub fn group_by_category(items: &[CourseItem]) -> BTreeMap<String, Vec<CourseItem>> {
    let mut grouped: BTreeMap<String, Vec<CourseItem>> = BTreeMap::new();
    for item in items {
        grouped
            .entry(item.category.clone())
            .or_default()
            .push(item.clone());
    }
    grouped
}

pub fn filter_by_category(items: &[CourseItem], category: &str) -> Vec<CourseItem> {
    items
        .iter()
        .filter(|item| item.category == category)
        .cloned()
        .collect()
}

/// Distinct categories, sorted.
pub fn distinct_categories(items: &[CourseItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
