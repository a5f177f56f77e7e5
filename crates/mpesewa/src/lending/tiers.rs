//! Lender subscription tiers and their lending limits.

use serde::{Deserialize, Serialize};

use super::subscription::BillingPeriod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierId {
    Basic,
    Premium,
    Super,
    LenderOfLenders,
}

impl TierId {
    pub const ALL: [TierId; 4] = [
        TierId::Basic,
        TierId::Premium,
        TierId::Super,
        TierId::LenderOfLenders,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            TierId::Basic => "basic",
            TierId::Premium => "premium",
            TierId::Super => "super",
            TierId::LenderOfLenders => "lender_of_lenders",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(TierId::Basic),
            "premium" => Some(TierId::Premium),
            "super" => Some(TierId::Super),
            "lender_of_lenders" | "lender-of-lenders" => Some(TierId::LenderOfLenders),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierPricing {
    pub monthly: f64,
    pub bi_annual: f64,
    pub annual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub id: TierId,
    pub name: String,
    /// Ceiling on outstanding principal across all of a lender's loans.
    pub weekly_limit: f64,
    pub per_loan_limit: f64,
    pub monthly_limit: f64,
    pub pricing: TierPricing,
}

impl TierSpec {
    pub fn price(&self, period: BillingPeriod) -> f64 {
        match period {
            BillingPeriod::Monthly => self.pricing.monthly,
            BillingPeriod::BiAnnual => self.pricing.bi_annual,
            BillingPeriod::Annual => self.pricing.annual,
        }
    }

    /// Percentage saved by paying annually instead of twelve monthly fees.
    pub fn annual_savings_percent(&self) -> f64 {
        let twelve_months = self.pricing.monthly * 12.0;
        if twelve_months <= 0.0 {
            return 0.0;
        }
        ((twelve_months - self.pricing.annual) / twelve_months * 100.0).max(0.0)
    }
}

/// True when adding `requested` keeps the lender within the weekly ceiling.
pub fn can_lend_amount(tier: &TierSpec, requested: f64, exposure: f64) -> bool {
    exposure + requested <= tier.weekly_limit
}

#[derive(Debug, Clone)]
pub struct TierRegistry {
    tiers: Vec<TierSpec>,
}

impl Default for TierRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TierRegistry {
    pub fn standard() -> Self {
        Self {
            tiers: vec![
                spec(TierId::Basic, "Basic", 1_500.0, 1_500.0, 6_000.0, (50.0, 250.0, 500.0)),
                spec(
                    TierId::Premium,
                    "Premium",
                    5_000.0,
                    10_000.0,
                    20_000.0,
                    (250.0, 1_500.0, 2_500.0),
                ),
                spec(
                    TierId::Super,
                    "Super",
                    20_000.0,
                    20_000.0,
                    80_000.0,
                    (1_000.0, 5_000.0, 8_500.0),
                ),
                spec(
                    TierId::LenderOfLenders,
                    "Lender of Lenders",
                    50_000.0,
                    50_000.0,
                    200_000.0,
                    (3_500.0, 6_500.0, 8_500.0),
                ),
            ],
        }
    }

    pub fn get(&self, id: TierId) -> &TierSpec {
        self.tiers
            .iter()
            .find(|tier| tier.id == id)
            .unwrap_or(&self.tiers[0])
    }

    /// Resolve a free-form tier id; unknown ids fall back to basic.
    pub fn lookup(&self, id: &str) -> &TierSpec {
        match TierId::parse(id) {
            Some(tier) => self.get(tier),
            None => {
                tracing::warn!(tier = id, "unknown subscription tier; falling back to basic");
                self.get(TierId::Basic)
            }
        }
    }

    pub fn tiers(&self) -> &[TierSpec] {
        &self.tiers
    }
}

fn spec(
    id: TierId,
    name: &str,
    weekly_limit: f64,
    per_loan_limit: f64,
    monthly_limit: f64,
    (monthly, bi_annual, annual): (f64, f64, f64),
) -> TierSpec {
    TierSpec {
        id,
        name: name.to_string(),
        weekly_limit,
        per_loan_limit,
        monthly_limit,
        pricing: TierPricing {
            monthly,
            bi_annual,
            annual,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tier_refuses_amount_over_weekly_ceiling() {
        let registry = TierRegistry::standard();
        let basic = registry.get(TierId::Basic);
        assert!(!can_lend_amount(basic, 600.0, 1_000.0));
        assert!(can_lend_amount(basic, 500.0, 1_000.0));
    }

    #[test]
    fn unknown_tier_falls_back_to_basic() {
        let registry = TierRegistry::standard();
        assert_eq!(registry.lookup("platinum").id, TierId::Basic);
        assert_eq!(registry.lookup("lender-of-lenders").id, TierId::LenderOfLenders);
    }

    #[test]
    fn prices_follow_billing_period() {
        let registry = TierRegistry::standard();
        let premium = registry.get(TierId::Premium);
        assert_eq!(premium.price(BillingPeriod::Monthly), 250.0);
        assert_eq!(premium.price(BillingPeriod::BiAnnual), 1_500.0);
        assert_eq!(premium.price(BillingPeriod::Annual), 2_500.0);

        let basic = registry.get(TierId::Basic);
        let savings = basic.annual_savings_percent();
        assert!((savings - (100.0 * 100.0 / 600.0)).abs() < 1e-9);
    }
}
