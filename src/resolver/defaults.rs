use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::deal::{
    DealFinancials, DebtTerms, EarnoutMetric, EarnoutTerms, FundingMix, ScenarioAssumptions,
    ScenarioType,
};
use crate::primitives::amortization::ScheduleType;
use crate::types::{Multiple, Rate};

/// Source of scenario-type-specific default assumptions.
///
/// The resolver depends only on this trait, so the deterministic math stays
/// testable independent of any external model or service behind it.
pub trait DefaultsProvider: Sync {
    fn defaults_for(&self, deal: &DealFinancials, scenario_type: &ScenarioType)
        -> ScenarioAssumptions;
}

/// Leverage heuristic band: entry EV/EBITDA multiples up to `max_multiple`
/// (None = open-ended) map to a senior debt share and rate.
struct LeverageBand {
    max_multiple: Option<Multiple>,
    debt_pct: Rate,
    rate: Rate,
}

/// Conventional mid-market terms; see DESIGN.md for the choice rationale.
const LEVERAGE_BANDS: [LeverageBand; 3] = [
    LeverageBand {
        max_multiple: Some(dec!(5.0)),
        debt_pct: dec!(0.50),
        rate: dec!(0.075),
    },
    LeverageBand {
        max_multiple: Some(dec!(7.0)),
        debt_pct: dec!(0.55),
        rate: dec!(0.08),
    },
    LeverageBand {
        max_multiple: None,
        debt_pct: dec!(0.60),
        rate: dec!(0.09),
    },
];

const DEFAULT_DISCOUNT_RATE: Rate = dec!(0.12);
const DEFAULT_EXIT_HORIZON_YEARS: u32 = 5;
const SELLER_NOTE_RATE: Rate = dec!(0.06);
const SELLER_NOTE_TERM_MONTHS: u32 = 60;
const SENIOR_DEBT_TERM_MONTHS: u32 = 84;

/// Static heuristic-table provider: deterministic defaults keyed off the
/// deal's entry multiple band. An ML or external-service provider can
/// replace it behind the same trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicTableProvider;

impl HeuristicTableProvider {
    /// Senior debt share and rate for a given entry EV/EBITDA multiple.
    pub fn leverage_terms(entry_multiple: Multiple) -> (Rate, Rate) {
        for band in &LEVERAGE_BANDS {
            match band.max_multiple {
                Some(max) if entry_multiple < max => return (band.debt_pct, band.rate),
                Some(_) => continue,
                None => return (band.debt_pct, band.rate),
            }
        }
        // Open-ended band always matches; unreachable in practice
        (dec!(0.60), dec!(0.09))
    }

    pub(crate) fn senior_debt_terms(rate: Rate) -> DebtTerms {
        DebtTerms {
            annual_rate: rate,
            term_months: SENIOR_DEBT_TERM_MONTHS,
            schedule: ScheduleType::LevelPayment,
        }
    }

    pub(crate) fn seller_note_terms() -> DebtTerms {
        DebtTerms {
            annual_rate: SELLER_NOTE_RATE,
            term_months: SELLER_NOTE_TERM_MONTHS,
            schedule: ScheduleType::InterestOnly,
        }
    }

    fn earnout_terms(deal: &DealFinancials, earnout_total: Decimal, horizon: u32) -> EarnoutTerms {
        EarnoutTerms {
            metric: EarnoutMetric::Ebitda,
            // Pays out in years where the business at least holds its
            // entry-level EBITDA
            threshold: deal.ltm_ebitda,
            annual_payment: earnout_total / Decimal::from(horizon),
            cap: earnout_total,
        }
    }
}

impl DefaultsProvider for HeuristicTableProvider {
    fn defaults_for(
        &self,
        deal: &DealFinancials,
        scenario_type: &ScenarioType,
    ) -> ScenarioAssumptions {
        let price = deal.mid_multiple() * deal.ltm_ebitda;
        let entry_multiple = deal.mid_multiple();
        let (debt_pct, debt_rate) = Self::leverage_terms(entry_multiple);
        let horizon = DEFAULT_EXIT_HORIZON_YEARS;

        let base = ScenarioAssumptions {
            purchase_price: price,
            mix: FundingMix::all_cash(),
            debt_terms: None,
            seller_note_terms: None,
            earnout_terms: None,
            discount_rate: DEFAULT_DISCOUNT_RATE,
            growth_rate: deal.growth_estimate,
            exit_multiple: entry_multiple,
            exit_horizon_years: horizon,
        };

        match scenario_type {
            ScenarioType::Cash | ScenarioType::Custom(_) => base,
            ScenarioType::Debt => ScenarioAssumptions {
                mix: FundingMix {
                    cash_pct: Decimal::ONE - debt_pct,
                    debt_pct,
                    seller_note_pct: Decimal::ZERO,
                    earnout_pct: Decimal::ZERO,
                },
                debt_terms: Some(Self::senior_debt_terms(debt_rate)),
                ..base
            },
            ScenarioType::SellerFinance => ScenarioAssumptions {
                mix: FundingMix {
                    cash_pct: dec!(0.60),
                    debt_pct: Decimal::ZERO,
                    seller_note_pct: dec!(0.40),
                    earnout_pct: Decimal::ZERO,
                },
                seller_note_terms: Some(Self::seller_note_terms()),
                ..base
            },
            ScenarioType::Earnout => {
                let earnout_total = price * dec!(0.30);
                ScenarioAssumptions {
                    mix: FundingMix {
                        cash_pct: dec!(0.70),
                        debt_pct: Decimal::ZERO,
                        seller_note_pct: Decimal::ZERO,
                        earnout_pct: dec!(0.30),
                    },
                    earnout_terms: Some(Self::earnout_terms(deal, earnout_total, horizon)),
                    ..base
                }
            }
            ScenarioType::Hybrid => {
                let earnout_total = price * dec!(0.10);
                ScenarioAssumptions {
                    mix: FundingMix {
                        cash_pct: dec!(0.40),
                        debt_pct: dec!(0.35),
                        seller_note_pct: dec!(0.15),
                        earnout_pct: dec!(0.10),
                    },
                    debt_terms: Some(Self::senior_debt_terms(debt_rate)),
                    seller_note_terms: Some(Self::seller_note_terms()),
                    earnout_terms: Some(Self::earnout_terms(deal, earnout_total, horizon)),
                    ..base
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::sample_deal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_leverage_bands() {
        assert_eq!(
            HeuristicTableProvider::leverage_terms(dec!(4.0)),
            (dec!(0.50), dec!(0.075))
        );
        assert_eq!(
            HeuristicTableProvider::leverage_terms(dec!(5.0)),
            (dec!(0.55), dec!(0.08))
        );
        assert_eq!(
            HeuristicTableProvider::leverage_terms(dec!(9.5)),
            (dec!(0.60), dec!(0.09))
        );
    }

    #[test]
    fn test_cash_defaults_are_all_cash() {
        let deal = sample_deal();
        let a = HeuristicTableProvider.defaults_for(&deal, &ScenarioType::Cash);
        assert_eq!(a.mix, FundingMix::all_cash());
        assert!(a.debt_terms.is_none());
        // Price = mid multiple (5.0) * EBITDA (2.5M) = 12.5M
        assert_eq!(a.purchase_price, dec!(12_500_000));
    }

    #[test]
    fn test_debt_defaults_carry_terms() {
        let deal = sample_deal();
        let a = HeuristicTableProvider.defaults_for(&deal, &ScenarioType::Debt);
        // Entry multiple 5.0 lands in the 5-7x band
        assert_eq!(a.mix.debt_pct, dec!(0.55));
        assert_eq!(a.mix.sum(), Decimal::ONE);
        let terms = a.debt_terms.unwrap();
        assert_eq!(terms.annual_rate, dec!(0.08));
    }

    #[test]
    fn test_every_standard_type_has_valid_mix() {
        let deal = sample_deal();
        for ty in ScenarioType::standard() {
            let a = HeuristicTableProvider.defaults_for(&deal, &ty);
            a.mix.validate().unwrap_or_else(|e| panic!("{ty}: {e}"));
        }
    }

    #[test]
    fn test_hybrid_has_all_legs() {
        let deal = sample_deal();
        let a = HeuristicTableProvider.defaults_for(&deal, &ScenarioType::Hybrid);
        assert!(a.debt_terms.is_some());
        assert!(a.seller_note_terms.is_some());
        assert!(a.earnout_terms.is_some());
        assert_eq!(a.mix.component_count(), 4);
    }
}
