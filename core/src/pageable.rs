//! Page requests carried as query parameters.
//!
//! A `ParamType::Pageable` argument never goes into the body. It expands
//! into `page`, `size` and one `sort=property,DIRECTION` entry per order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ArgumentError;
use crate::http::RequestPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub property: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pageable {
    pub page: u32,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortOrder>,
}

impl Pageable {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            sort: Vec::new(),
        }
    }

    pub fn sorted(mut self, property: impl Into<String>, direction: Direction) -> Self {
        self.sort.push(SortOrder {
            property: property.into(),
            direction,
        });
        self
    }
}

/// Expand the pageable argument at `index` into query parameters of `plan`.
///
/// `page` and `size` replace earlier values; sort orders are appended after
/// any `sort` entries already present.
pub fn apply(plan: &mut RequestPlan, index: usize, value: &Value) -> Result<(), ArgumentError> {
    let pageable: Pageable = serde_json::from_value(value.clone()).map_err(|e| ArgumentError::InvalidPageable {
        index,
        reason: e.to_string(),
    })?;
    plan.set_query("page", vec![pageable.page.to_string()]);
    plan.set_query("size", vec![pageable.size.to_string()]);
    for order in &pageable.sort {
        plan.append_query("sort", format!("{},{}", order.property, order.direction.as_str()));
    }
    Ok(())
}
