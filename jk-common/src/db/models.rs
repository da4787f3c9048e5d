//! Database models

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Canonical vocabulary entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Uuid,
    /// Unique lookup key
    pub name: String,
    pub display_name: String,
    pub category: Option<String>,
    /// Alternate names resolved to this ingredient
    pub aliases: Vec<String>,
    /// Number of recipes referencing this ingredient
    pub usage_count: i64,
    pub is_common: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ingredient {
    /// New ingredient with `display_name == name` and empty metadata
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            display_name: name.clone(),
            name,
            category: None,
            aliases: Vec::new(),
            usage_count: 0,
            is_common: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_usage_count(mut self, usage_count: i64) -> Self {
        self.usage_count = usage_count;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn common(mut self) -> Self {
        self.is_common = true;
        self
    }

    /// Decode from a `SELECT id, name, display_name, category, aliases,
    /// usage_count, is_common, created_at, updated_at` row
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let id: String = row.try_get("id")?;
        let aliases: String = row.try_get("aliases")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Self {
            id: parse_uuid(&id)?,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            category: row.try_get("category")?,
            aliases: parse_aliases(&aliases),
            usage_count: row.try_get("usage_count")?,
            is_common: row.try_get::<i64, _>("is_common")? != 0,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

/// One recipe's reference to one ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredientLink {
    pub id: Uuid,
    pub recipe_id: String,
    pub ingredient_id: Uuid,
    /// Free-text quantity ("1 1/2", "to taste")
    pub amount: Option<String>,
    pub unit: Option<String>,
    pub position: i64,
}

impl RecipeIngredientLink {
    pub fn new(
        recipe_id: impl Into<String>,
        ingredient_id: Uuid,
        amount: Option<&str>,
        unit: Option<&str>,
        position: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipe_id: recipe_id.into(),
            ingredient_id,
            amount: amount.map(str::to_string),
            unit: unit.map(str::to_string),
            position,
        }
    }

    /// Decode from a `SELECT id, recipe_id, ingredient_id, amount, unit, position` row
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let id: String = row.try_get("id")?;
        let ingredient_id: String = row.try_get("ingredient_id")?;

        Ok(Self {
            id: parse_uuid(&id)?,
            recipe_id: row.try_get("recipe_id")?,
            ingredient_id: parse_uuid(&ingredient_id)?,
            amount: row.try_get("amount")?,
            unit: row.try_get("unit")?,
            position: row.try_get("position")?,
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))
}

/// Alias column is a JSON array; anything else decodes as empty
fn parse_aliases(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(value).unwrap_or_else(|e| {
        tracing::warn!(raw = %value, error = %e, "Ignoring malformed aliases column");
        Vec::new()
    })
}
