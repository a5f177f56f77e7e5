//! Countries and loan categories. Loaded once and never mutated; lookups of
//! unknown codes fail instead of falling back to synthesized records.

use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

use super::domain::{CategoryId, CountryCode};
use super::money::format_currency;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub code: CountryCode,
    pub name: String,
    pub currency_code: String,
    pub currency_symbol: String,
    pub timezone: String,
    pub min_loan: f64,
    pub max_loan: f64,
}

impl Country {
    pub fn format(&self, amount: f64) -> String {
        format_currency(amount, &self.currency_symbol)
    }

    pub fn accepts(&self, amount: f64) -> bool {
        amount >= self.min_loan && amount <= self.max_loan
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanCategory {
    pub id: CategoryId,
    pub name: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub default_amount: f64,
}

impl LoanCategory {
    pub fn accepts(&self, amount: f64) -> bool {
        amount >= self.min_amount && amount <= self.max_amount
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("unknown country '{0}'")]
    UnknownCountry(String),
    #[error("unknown loan category '{0}'")]
    UnknownCategory(String),
    #[error("reference data contains no {0}")]
    Empty(&'static str),
    #[error("'{0}' has a minimum above its maximum")]
    InvalidBounds(String),
    #[error("reference data is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    countries: Vec<Country>,
    categories: Vec<LoanCategory>,
}

#[derive(Debug, Clone)]
pub struct ReferenceData {
    countries: BTreeMap<CountryCode, Country>,
    categories: BTreeMap<CategoryId, LoanCategory>,
}

impl ReferenceData {
    /// Build from explicit tables, rejecting empty tables and inverted bounds.
    pub fn new(
        countries: Vec<Country>,
        categories: Vec<LoanCategory>,
    ) -> Result<Self, ReferenceError> {
        if countries.is_empty() {
            return Err(ReferenceError::Empty("countries"));
        }
        if categories.is_empty() {
            return Err(ReferenceError::Empty("categories"));
        }
        if let Some(country) = countries.iter().find(|c| c.min_loan > c.max_loan) {
            return Err(ReferenceError::InvalidBounds(country.code.to_string()));
        }
        if let Some(category) = categories.iter().find(|c| c.min_amount > c.max_amount) {
            return Err(ReferenceError::InvalidBounds(category.id.to_string()));
        }

        Ok(Self {
            countries: countries
                .into_iter()
                .map(|country| (country.code.clone(), country))
                .collect(),
            categories: categories
                .into_iter()
                .map(|category| (category.id.clone(), category))
                .collect(),
        })
    }

    /// Parse `{ "countries": [...], "categories": [...] }`.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ReferenceError> {
        let file: ReferenceFile = serde_json::from_reader(reader)?;
        Self::new(file.countries, file.categories)
    }

    /// The twelve launch countries and sixteen loan categories.
    pub fn standard() -> Self {
        Self {
            countries: standard_countries()
                .into_iter()
                .map(|country| (country.code.clone(), country))
                .collect(),
            categories: standard_categories()
                .into_iter()
                .map(|category| (category.id.clone(), category))
                .collect(),
        }
    }

    pub fn country(&self, code: &CountryCode) -> Result<&Country, ReferenceError> {
        self.countries
            .get(code)
            .ok_or_else(|| ReferenceError::UnknownCountry(code.to_string()))
    }

    pub fn category(&self, id: &CategoryId) -> Result<&LoanCategory, ReferenceError> {
        self.categories
            .get(id)
            .ok_or_else(|| ReferenceError::UnknownCategory(id.to_string()))
    }

    pub fn countries(&self) -> impl Iterator<Item = &Country> {
        self.countries.values()
    }

    pub fn categories(&self) -> impl Iterator<Item = &LoanCategory> {
        self.categories.values()
    }
}

fn country(
    code: &str,
    name: &str,
    currency_code: &str,
    currency_symbol: &str,
    timezone: &str,
    min_loan: f64,
    max_loan: f64,
) -> Country {
    Country {
        code: CountryCode::new(code),
        name: name.to_string(),
        currency_code: currency_code.to_string(),
        currency_symbol: currency_symbol.to_string(),
        timezone: timezone.to_string(),
        min_loan,
        max_loan,
    }
}

fn standard_countries() -> Vec<Country> {
    vec![
        country("KE", "Kenya", "KES", "KSh", "Africa/Nairobi", 50.0, 50_000.0),
        country("UG", "Uganda", "UGX", "UGX", "Africa/Kampala", 1_000.0, 50_000_000.0),
        country("TZ", "Tanzania", "TZS", "TZS", "Africa/Dar_es_Salaam", 1_000.0, 5_000_000.0),
        country("RW", "Rwanda", "RWF", "RWF", "Africa/Kigali", 100.0, 500_000.0),
        country("BI", "Burundi", "BIF", "BIF", "Africa/Bujumbura", 1_000.0, 1_000_000.0),
        country("SO", "Somalia", "SOS", "SOS", "Africa/Mogadishu", 1_000.0, 1_000_000.0),
        country("SS", "South Sudan", "SSP", "SSP", "Africa/Juba", 100.0, 500_000.0),
        country("ET", "Ethiopia", "ETB", "ETB", "Africa/Addis_Ababa", 10.0, 50_000.0),
        country("CD", "DRC", "CDF", "CDF", "Africa/Kinshasa", 1_000.0, 500_000.0),
        country("NG", "Nigeria", "NGN", "₦", "Africa/Lagos", 100.0, 500_000.0),
        country("ZA", "South Africa", "ZAR", "R", "Africa/Johannesburg", 10.0, 50_000.0),
        country("GH", "Ghana", "GHS", "₵", "Africa/Accra", 5.0, 50_000.0),
    ]
}

fn category(id: &str, name: &str, min_amount: f64, max_amount: f64, default_amount: f64) -> LoanCategory {
    LoanCategory {
        id: CategoryId::new(id),
        name: name.to_string(),
        min_amount,
        max_amount,
        default_amount,
    }
}

fn standard_categories() -> Vec<LoanCategory> {
    vec![
        category("fare", "M-pesewa Fare", 50.0, 50_000.0, 1_000.0),
        category("data", "M-pesewa Data", 100.0, 5_000.0, 500.0),
        category("cooking-gas", "M-pesewa Cooking Gas", 500.0, 10_000.0, 2_000.0),
        category("food", "M-pesewa Food", 200.0, 10_000.0, 1_000.0),
        category("credo", "M-pesewa Credo", 500.0, 50_000.0, 5_000.0),
        category("water-bill", "M-pesewa Water Bill", 300.0, 20_000.0, 1_500.0),
        category("fuel", "M-pesewa Bike Car Tuktuk Fuel", 200.0, 10_000.0, 1_000.0),
        category("repair", "M-pesewa Bike Car Tuktuk Repair", 500.0, 50_000.0, 5_000.0),
        category("medicine", "M-pesewa Medicine", 300.0, 20_000.0, 2_000.0),
        category("electricity", "M-pesewa Electricity Tokens", 100.0, 10_000.0, 1_000.0),
        category("school-fees", "M-pesewa School Fees", 1_000.0, 100_000.0, 5_000.0),
        category("tv-subscription", "M-pesewa TV Subscription", 200.0, 10_000.0, 1_000.0),
        category("wifi", "M-pesewa Wifi", 500.0, 15_000.0, 3_000.0),
        category("advance", "M-pesewa Advance", 1_000.0, 50_000.0, 5_000.0),
        category("daily-sales", "M-Pesa Daily Sales Advance", 500.0, 20_000.0, 3_000.0),
        category("working-capital", "M-Pesa Working Capital Advance", 5_000.0, 100_000.0, 20_000.0),
    ]
}
