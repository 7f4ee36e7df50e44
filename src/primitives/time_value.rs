use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::DealEngineError;
use crate::types::{Money, Rate};
use crate::DealEngineResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const BISECTION_LOW: Decimal = dec!(-0.99);
const BISECTION_HIGH: Decimal = dec!(10.0);

/// Net Present Value of a series of cash flows.
/// Defined for any rate > -100%.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> DealEngineResult<Money> {
    if rate <= dec!(-1) {
        return Err(DealEngineError::InvalidAssumption {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        if discount.is_zero() {
            return Err(DealEngineError::DivisionByZero {
                context: format!("NPV discount factor at period {t}"),
            });
        }
        result += cf / discount;
    }

    Ok(result)
}

/// NPV without the rate precondition, for solver internals where the
/// candidate rate is already bounded away from -100%.
fn npv_unchecked(rate: Rate, cash_flows: &[Money]) -> Decimal {
    let one_plus_r = Decimal::ONE + rate;
    let mut result = Decimal::ZERO;
    let mut discount = Decimal::ONE;
    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        if discount.is_zero() {
            continue;
        }
        result += cf / discount;
    }
    result
}

/// Internal Rate of Return: Newton-Raphson with a bisection fallback.
///
/// Fails with `NonConvergence` if the cash flows contain no sign change
/// (IRR is mathematically undefined) or if no root is found within the
/// iteration caps. Never silently returns a default.
pub fn irr(cash_flows: &[Money], guess: Rate) -> DealEngineResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(DealEngineError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }

    let has_outflow = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    let has_inflow = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    if !has_outflow || !has_inflow {
        return Err(DealEngineError::NonConvergence {
            function: "IRR".into(),
            iterations: 0,
            last_delta: cash_flows.iter().sum(),
        });
    }

    let mut rate = guess;

    for _ in 0..MAX_IRR_ITERATIONS {
        let mut npv_val = Decimal::ZERO;
        let mut dnpv = Decimal::ZERO;
        let one_plus_r = Decimal::ONE + rate;

        for (t, cf) in cash_flows.iter().enumerate() {
            let t_dec = Decimal::from(t as i64);
            let discount = one_plus_r.powd(t_dec);
            if discount.is_zero() {
                continue;
            }
            npv_val += cf / discount;
            if t > 0 {
                dnpv -= t_dec * cf / (one_plus_r.powd(t_dec + Decimal::ONE));
            }
        }

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }

        if dnpv.is_zero() {
            break;
        }

        rate -= npv_val / dnpv;

        // Guard against divergence
        if rate < BISECTION_LOW {
            rate = BISECTION_LOW;
        } else if rate > dec!(100.0) {
            rate = dec!(100.0);
        }
    }

    bisect_irr(cash_flows)
}

/// Bisection fallback over [-99%, 1000%].
fn bisect_irr(cash_flows: &[Money]) -> DealEngineResult<Rate> {
    let mut lo = BISECTION_LOW;
    let mut hi = BISECTION_HIGH;
    let mut f_lo = npv_unchecked(lo, cash_flows);
    let f_hi = npv_unchecked(hi, cash_flows);

    if (f_lo > Decimal::ZERO) == (f_hi > Decimal::ZERO) {
        return Err(DealEngineError::NonConvergence {
            function: "IRR".into(),
            iterations: MAX_IRR_ITERATIONS,
            last_delta: f_lo.min(f_hi),
        });
    }

    let mut mid = (lo + hi) / dec!(2);
    for _ in 0..MAX_IRR_ITERATIONS {
        mid = (lo + hi) / dec!(2);
        let f_mid = npv_unchecked(mid, cash_flows);

        if f_mid.abs() < CONVERGENCE_THRESHOLD || (hi - lo).abs() < CONVERGENCE_THRESHOLD {
            return Ok(mid);
        }

        if (f_mid > Decimal::ZERO) == (f_lo > Decimal::ZERO) {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(DealEngineError::NonConvergence {
        function: "IRR".into(),
        iterations: MAX_IRR_ITERATIONS * 2,
        last_delta: npv_unchecked(mid, cash_flows),
    })
}

/// Extended IRR for irregular cash flow dates (earnout payments rarely
/// land on anniversaries). Newton-Raphson only; callers fall back to the
/// periodic `irr` when dates are regular.
pub fn xirr(dated_flows: &[(NaiveDate, Money)], guess: Rate) -> DealEngineResult<Rate> {
    if dated_flows.len() < 2 {
        return Err(DealEngineError::InsufficientData(
            "XIRR requires at least 2 cash flows".into(),
        ));
    }

    let base_date = dated_flows[0].0;
    let mut rate = guess;

    for i in 0..MAX_IRR_ITERATIONS {
        let mut npv_val = Decimal::ZERO;
        let mut dnpv = Decimal::ZERO;

        for (date, amount) in dated_flows {
            let days = (*date - base_date).num_days();
            let years = Decimal::from(days) / dec!(365.25);
            let one_plus_r = Decimal::ONE + rate;

            if one_plus_r <= Decimal::ZERO {
                return Err(DealEngineError::NonConvergence {
                    function: "XIRR".into(),
                    iterations: i,
                    last_delta: npv_val,
                });
            }

            let discount = one_plus_r.powd(years);
            if discount.is_zero() {
                continue;
            }

            npv_val += amount / discount;
            dnpv -= years * amount / (one_plus_r * discount);
        }

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }

        if dnpv.is_zero() {
            return Err(DealEngineError::NonConvergence {
                function: "XIRR".into(),
                iterations: i,
                last_delta: npv_val,
            });
        }

        rate -= npv_val / dnpv;

        if rate < BISECTION_LOW {
            rate = BISECTION_LOW;
        } else if rate > dec!(100.0) {
            rate = dec!(100.0);
        }
    }

    Err(DealEngineError::NonConvergence {
        function: "XIRR".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta: Decimal::ZERO,
    })
}

/// Present value of a level payment stream plus a terminal amount.
pub fn pv(rate: Rate, nper: u32, payment: Money, future_value: Money) -> DealEngineResult<Money> {
    if rate <= dec!(-1) {
        return Err(DealEngineError::InvalidAssumption {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    if rate.is_zero() {
        return Ok(payment * Decimal::from(nper) + future_value);
    }

    let one_plus_r = Decimal::ONE + rate;
    let factor = one_plus_r.powd(Decimal::from(nper));

    if factor.is_zero() {
        return Err(DealEngineError::DivisionByZero {
            context: "PV factor".into(),
        });
    }

    let annuity_factor = (Decimal::ONE - Decimal::ONE / factor) / rate;
    Ok(payment * annuity_factor + future_value / factor)
}

/// Payment (PMT): level payment that amortizes `present_value` over
/// `nper` periods at `rate` per period.
pub fn pmt(rate: Rate, nper: u32, present_value: Money) -> DealEngineResult<Money> {
    if nper == 0 {
        return Err(DealEngineError::InvalidTerm {
            field: "nper".into(),
            reason: "Number of periods must be > 0".into(),
        });
    }

    if rate.is_zero() {
        return Ok(present_value / Decimal::from(nper));
    }

    let one_plus_r = Decimal::ONE + rate;
    let factor = one_plus_r.powd(Decimal::from(nper));
    let annuity_factor = (factor - Decimal::ONE) / rate;

    if annuity_factor.is_zero() {
        return Err(DealEngineError::DivisionByZero {
            context: "PMT annuity factor".into(),
        });
    }

    Ok(present_value * factor / annuity_factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_npv_basic() {
        let cfs = vec![dec!(-1000), dec!(300), dec!(400), dec!(500)];
        let result = npv(dec!(0.10), &cfs).unwrap();
        // -1000 + 300/1.1 + 400/1.21 + 500/1.331 ≈ -21.04
        assert!((result - dec!(-21.04)).abs() < dec!(1.0));
    }

    #[test]
    fn test_npv_zero_rate() {
        let cfs = vec![dec!(-100), dec!(50), dec!(50), dec!(50)];
        let result = npv(dec!(0.0), &cfs).unwrap();
        assert_eq!(result, dec!(50));
    }

    #[test]
    fn test_npv_invalid_rate() {
        let cfs = vec![dec!(-100), dec!(50)];
        assert!(npv(dec!(-1), &cfs).is_err());
    }

    #[test]
    fn test_irr_basic() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let result = irr(&cfs, dec!(0.10)).unwrap();
        // IRR should be ~9.7%
        assert!((result - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_irr_npv_consistency() {
        let cfs = vec![dec!(-12500), dec!(0), dec!(0), dec!(0), dec!(0), dec!(33600)];
        let r = irr(&cfs, dec!(0.10)).unwrap();
        let residual = npv(r, &cfs).unwrap();
        assert!(residual.abs() < dec!(0.0001), "npv(irr) = {residual}");
    }

    #[test]
    fn test_irr_no_sign_change_is_error() {
        let cfs = vec![dec!(100), dec!(200), dec!(300)];
        let err = irr(&cfs, dec!(0.10)).unwrap_err();
        match err {
            DealEngineError::NonConvergence { iterations, .. } => assert_eq!(iterations, 0),
            other => panic!("expected NonConvergence, got {other:?}"),
        }
    }

    #[test]
    fn test_irr_all_negative_is_error() {
        let cfs = vec![dec!(-100), dec!(-200)];
        assert!(irr(&cfs, dec!(0.10)).is_err());
    }

    #[test]
    fn test_irr_too_few_flows() {
        let cfs = vec![dec!(-100)];
        assert!(matches!(
            irr(&cfs, dec!(0.10)),
            Err(DealEngineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_irr_bisection_fallback_high_return() {
        // 5x in one period: Newton from a low guess handles this, but the
        // answer is exact so we can assert tightly either way.
        let cfs = vec![dec!(-100), dec!(500)];
        let r = irr(&cfs, dec!(0.10)).unwrap();
        assert!((r - dec!(4)).abs() < dec!(0.001), "got {r}");
    }

    #[test]
    fn test_xirr_basic() {
        let d = |y, m| NaiveDate::from_ymd_opt(y, m, 1).unwrap();
        let flows = vec![
            (d(2024, 1), dec!(-1000)),
            (d(2025, 1), dec!(400)),
            (d(2026, 1), dec!(400)),
            (d(2027, 1), dec!(400)),
        ];
        let r = xirr(&flows, dec!(0.10)).unwrap();
        assert!((r - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_pv_annuity() {
        // 100/period for 3 periods at 10% ≈ 248.69
        let result = pv(dec!(0.10), 3, dec!(100), Decimal::ZERO).unwrap();
        assert!((result - dec!(248.69)).abs() < dec!(0.01));
    }

    #[test]
    fn test_pv_terminal_value_only() {
        // 1000 in 5 periods at 10% ≈ 620.92
        let result = pv(dec!(0.10), 5, Decimal::ZERO, dec!(1000)).unwrap();
        assert!((result - dec!(620.92)).abs() < dec!(0.01));
    }

    #[test]
    fn test_pv_zero_rate() {
        let result = pv(dec!(0), 4, dec!(25), dec!(100)).unwrap();
        assert_eq!(result, dec!(200));
    }

    #[test]
    fn test_pmt_level_payment() {
        // 1000 at 1% monthly over 12 months ≈ 88.85/month
        let p = pmt(dec!(0.01), 12, dec!(1000)).unwrap();
        assert!((p - dec!(88.85)).abs() < dec!(0.01));
    }

    #[test]
    fn test_pmt_zero_rate() {
        let p = pmt(dec!(0), 10, dec!(1000)).unwrap();
        assert_eq!(p, dec!(100));
    }

    #[test]
    fn test_pmt_zero_periods() {
        assert!(pmt(dec!(0.01), 0, dec!(1000)).is_err());
    }
}
