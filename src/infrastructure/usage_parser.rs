//! Extraction of usage numbers from the portal overview markup

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::domain::constants::portal::UNIT_LABEL;
use crate::domain::usage::Measurement;

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"\d+(?:[.,]\d+)?").unwrap();
}

/// Read the first element matching `block_selector`.
///
/// Returns `None` when the page has no such block. Inside the block the first
/// two numbers are `used` and `total`; missing numbers come back as NaN.
pub fn parse_usage_block(html: &str, block_selector: &str) -> Option<Measurement> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(block_selector).ok()?;
    let block = document.select(&selector).next()?;
    let measurement = measurement_from(block);
    debug!(
        selector = block_selector,
        used = measurement.used,
        total = measurement.total,
        unit = %measurement.unit,
        "Parsed usage block"
    );
    Some(measurement)
}

fn measurement_from(block: ElementRef<'_>) -> Measurement {
    let unit = Selector::parse(UNIT_LABEL)
        .ok()
        .and_then(|sel| block.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let text: String = block.text().collect();
    let mut numbers = NUMBER
        .find_iter(&text)
        .map(|m| m.as_str().replace(',', ".").parse::<f64>().unwrap_or(f64::NAN));

    let used = numbers.next().unwrap_or(f64::NAN);
    let total = numbers.next().unwrap_or(f64::NAN);
    Measurement { used, total, unit }
}
