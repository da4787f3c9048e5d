//! Free-text quantity parsing
//!
//! Recipe links store amount and unit as entered ("1 1/2", "½", "2-3",
//! "to taste"). Merging two links of the same ingredient needs a numeric
//! value and a comparable unit, so this module parses both into a
//! [`QuantityParse`].

use serde::{Deserialize, Serialize};

/// Result of parsing one amount/unit pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuantityParse {
    /// Numeric amount with normalized unit (`"each"` when unitless)
    Parsed { amount: f64, unit: String },
    /// Intentionally unquantified ("to taste", blank)
    NoValue,
    /// Text that should be numeric but is not
    Unparseable(String),
}

impl QuantityParse {
    pub fn is_parsed(&self) -> bool {
        matches!(self, QuantityParse::Parsed { .. })
    }
}

/// Phrases meaning "no specific amount"
const NO_VALUE_PHRASES: &[&str] = &[
    "to taste",
    "as needed",
    "as required",
    "optional",
    "for garnish",
    "for serving",
    "for dusting",
    "for frying",
    "for greasing",
];

/// Unicode vulgar fractions
const VULGAR_FRACTIONS: &[(char, &str)] = &[
    ('½', "1/2"),
    ('⅓', "1/3"),
    ('⅔', "2/3"),
    ('¼', "1/4"),
    ('¾', "3/4"),
    ('⅕', "1/5"),
    ('⅖', "2/5"),
    ('⅗', "3/5"),
    ('⅘', "4/5"),
    ('⅙', "1/6"),
    ('⅚', "5/6"),
    ('⅛', "1/8"),
    ('⅜', "3/8"),
    ('⅝', "5/8"),
    ('⅞', "7/8"),
];

/// Parse an amount/unit pair
///
/// **Algorithm:**
/// 1. Blank amount or a no-value phrase → `NoValue`
/// 2. Rewrite vulgar fractions, fraction slashes, dashes and "to" ranges
///    into ASCII forms
/// 3. Read a leading number: integer, decimal, `a/b`, mixed `n a/b`, or a
///    range `x-y` (averaged)
/// 4. Unit comes from the unit column, or from the words following the
///    number when the column is empty
/// 5. No leading number → `Unparseable`
pub fn parse_quantity(amount: Option<&str>, unit: Option<&str>) -> QuantityParse {
    let raw = amount.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return QuantityParse::NoValue;
    }

    let lower = raw.to_lowercase();
    if NO_VALUE_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return QuantityParse::NoValue;
    }

    let prepared = prepare(&lower);
    let tokens: Vec<&str> = prepared.split_whitespace().collect();

    let Some((value, consumed)) = parse_leading_number(&tokens) else {
        return QuantityParse::Unparseable(raw.to_string());
    };

    let unit_text = match unit.map(str::trim).filter(|u| !u.is_empty()) {
        Some(column) => column.to_string(),
        None => tokens[consumed..].join(" "),
    };

    QuantityParse::Parsed {
        amount: value,
        unit: normalize_unit(&unit_text),
    }
}

/// Canonical unit spelling used for compatibility checks
///
/// Unit-less, "each", "whole" and "piece" all normalize to `"each"`.
pub fn normalize_unit(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('.');

    // Capital T is the conventional tablespoon abbreviation
    if trimmed == "T" || trimmed == "Tbsp" || trimmed == "TBSP" {
        return "tablespoon".to_string();
    }

    let lower = trimmed.to_lowercase();
    let unit = match lower.as_str() {
        "" | "each" | "ea" | "whole" | "piece" | "pieces" | "pc" | "pcs" | "item" | "items" => "each",
        "tbsp" | "tbs" | "tbl" | "tbsps" | "tablespoon" | "tablespoons" => "tablespoon",
        "t" | "tsp" | "tsps" | "teaspoon" | "teaspoons" => "teaspoon",
        "c" | "cup" | "cups" => "cup",
        "oz" | "ounce" | "ounces" => "ounce",
        "fl oz" | "fl. oz" | "floz" | "fluid ounce" | "fluid ounces" => "fluid ounce",
        "lb" | "lbs" | "pound" | "pounds" => "pound",
        "g" | "gr" | "gram" | "grams" => "gram",
        "kg" | "kgs" | "kilogram" | "kilograms" => "kilogram",
        "mg" | "milligram" | "milligrams" => "milligram",
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => "milliliter",
        "l" | "liter" | "liters" | "litre" | "litres" => "liter",
        "qt" | "quart" | "quarts" => "quart",
        "pt" | "pint" | "pints" => "pint",
        "gal" | "gallon" | "gallons" => "gallon",
        "pinch" | "pinches" => "pinch",
        "dash" | "dashes" => "dash",
        "clove" | "cloves" => "clove",
        "can" | "cans" => "can",
        "bunch" | "bunches" => "bunch",
        "sprig" | "sprigs" => "sprig",
        "slice" | "slices" => "slice",
        "stick" | "sticks" => "stick",
        "head" | "heads" => "head",
        "package" | "packages" | "pkg" => "package",
        other => return singular_unit(other),
    };
    unit.to_string()
}

/// Render a merged amount: integers without decimals, otherwise up to three places
pub fn format_amount(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        return format!("{:.0}", value);
    }
    let text = format!("{:.3}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn singular_unit(unit: &str) -> String {
    if unit.len() > 3 && unit.ends_with('s') && !unit.ends_with("ss") {
        unit[..unit.len() - 1].to_string()
    } else {
        unit.to_string()
    }
}

/// ASCII-fy fractions and ranges so the tokenizer sees `1 1/2`, `2-3`
fn prepare(lower: &str) -> String {
    let mut out = String::with_capacity(lower.len() + 8);
    for ch in lower.chars() {
        if let Some((_, ascii)) = VULGAR_FRACTIONS.iter().find(|(c, _)| *c == ch) {
            out.push(' ');
            out.push_str(ascii);
            out.push(' ');
        } else {
            match ch {
                '\u{2044}' => out.push('/'),
                '\u{2013}' | '\u{2014}' => out.push('-'),
                _ => out.push(ch),
            }
        }
    }

    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.replace(" to ", "-").replace(" - ", "-").replace(" -", "-").replace("- ", "-")
}

/// Leading number and the count of tokens it used
fn parse_leading_number(tokens: &[&str]) -> Option<(f64, usize)> {
    let first = *tokens.first()?;

    if let Some((low, high)) = first.split_once('-') {
        let low = parse_simple(low)?;
        let high = parse_simple(high)?;
        return Some(((low + high) / 2.0, 1));
    }

    let whole = parse_simple(first)?;

    // Mixed number: "1 1/2"
    if !first.contains('/') {
        if let Some(next) = tokens.get(1) {
            if next.contains('/') && !next.contains('-') {
                if let Some(fraction) = parse_fraction(next) {
                    return Some((whole + fraction, 2));
                }
            }
        }
    }

    Some((whole, 1))
}

/// Integer, decimal or `a/b`
fn parse_simple(token: &str) -> Option<f64> {
    if token.contains('/') {
        return parse_fraction(token);
    }
    let value: f64 = token.replace(',', ".").parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

fn parse_fraction(token: &str) -> Option<f64> {
    let (numerator, denominator) = token.split_once('/')?;
    let numerator: f64 = numerator.parse().ok()?;
    let denominator: f64 = denominator.parse().ok()?;
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}
