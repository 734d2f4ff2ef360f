// Monthly payment estimate for an amortizing car loan

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DOWN_PAYMENT_SHARE: f64 = 0.2;
pub const DEFAULT_TERM_MONTHS: u32 = 48;
pub const DEFAULT_ANNUAL_RATE_PERCENT: f64 = 3.9;

#[derive(Debug, Error, PartialEq)]
pub enum FinanceError {
    #[error("vehicle price must be a non-negative number, got {0}")]
    InvalidPrice(f64),
    #[error("down payment must be between 0 and the vehicle price ({price}), got {down_payment}")]
    InvalidDownPayment { down_payment: f64, price: f64 },
    #[error("loan term must be at least one month")]
    ZeroTerm,
    #[error("interest rate must be a non-negative percentage, got {0}")]
    InvalidRate(f64),
    #[error("loan figures for a price of {price} at {annual_rate_percent}% are too large to quote")]
    OutOfRange { price: f64, annual_rate_percent: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRequest {
    pub price: f64,
    pub down_payment: f64,
    pub term_months: u32,
    pub annual_rate_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanQuote {
    pub loan_amount: f64,
    pub monthly_payment: f64,
    pub total_interest: f64,
    pub total_cost: f64,
}

impl LoanRequest {
    /// The calculator's starting point for a vehicle: 20% down (whole units),
    /// 48 months at 3.9%.
    pub fn with_defaults(price: f64) -> Self {
        LoanRequest {
            price,
            down_payment: (price * DEFAULT_DOWN_PAYMENT_SHARE).round(),
            term_months: DEFAULT_TERM_MONTHS,
            annual_rate_percent: DEFAULT_ANNUAL_RATE_PERCENT,
        }
    }

    pub fn validate(&self) -> Result<(), FinanceError> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(FinanceError::InvalidPrice(self.price));
        }
        if !self.down_payment.is_finite() || self.down_payment < 0.0 || self.down_payment > self.price {
            return Err(FinanceError::InvalidDownPayment {
                down_payment: self.down_payment,
                price: self.price,
            });
        }
        if self.term_months == 0 {
            return Err(FinanceError::ZeroTerm);
        }
        if !self.annual_rate_percent.is_finite() || self.annual_rate_percent < 0.0 {
            return Err(FinanceError::InvalidRate(self.annual_rate_percent));
        }
        Ok(())
    }

    pub fn quote(&self) -> Result<LoanQuote, FinanceError> {
        calculate(self)
    }
}

/// Annuity payment for the loan left after the down payment. A zero rate
/// falls back to a straight split of the principal over the term.
pub fn calculate(request: &LoanRequest) -> Result<LoanQuote, FinanceError> {
    request.validate()?;

    let loan_amount = request.price - request.down_payment;
    let months = request.term_months as f64;
    let monthly_rate = request.annual_rate_percent / 100.0 / 12.0;

    // 1 - (1 + r)^-n, computed without forming (1 + r)^n, which overflows for
    // large rates or terms. It tends to 1, so the payment tends to loan * r.
    let discount = -(-(months * monthly_rate.ln_1p())).exp_m1();
    let monthly_payment = if monthly_rate > 0.0 && discount > 0.0 {
        loan_amount * monthly_rate / discount
    } else {
        loan_amount / months
    };

    let total_repaid = monthly_payment * months;
    if !total_repaid.is_finite() {
        return Err(FinanceError::OutOfRange {
            price: request.price,
            annual_rate_percent: request.annual_rate_percent,
        });
    }
    // Rounding can leave a tiny negative residue on interest-free loans
    let total_interest = (total_repaid - loan_amount).max(0.0);
    let total_cost = request.price + total_interest;
    if !total_cost.is_finite() {
        return Err(FinanceError::OutOfRange {
            price: request.price,
            annual_rate_percent: request.annual_rate_percent,
        });
    }

    Ok(LoanQuote {
        loan_amount,
        monthly_payment,
        total_interest,
        total_cost,
    })
}

/// Quote with the default terms, as shown beside a listing.
pub fn quick_quote(price: f64) -> Result<LoanQuote, FinanceError> {
    calculate(&LoanRequest::with_defaults(price))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(price: f64, down_payment: f64, term_months: u32, annual_rate_percent: f64) -> LoanRequest {
        LoanRequest { price, down_payment, term_months, annual_rate_percent }
    }

    #[test]
    fn matches_closed_form_annuity() {
        let quote = calculate(&request(100_000.0, 20_000.0, 48, 3.9)).unwrap();

        let r: f64 = 3.9 / 100.0 / 12.0;
        let expected = 80_000.0 * r * (1.0 + r).powf(48.0) / ((1.0 + r).powf(48.0) - 1.0);
        assert_eq!(quote.loan_amount, 80_000.0);
        assert!((quote.monthly_payment - expected).abs() < 1e-6);
        assert!(quote.monthly_payment > 1_795.0 && quote.monthly_payment < 1_810.0);
        assert!((quote.total_interest - (expected * 48.0 - 80_000.0)).abs() < 1e-6);
        assert!((quote.total_cost - (100_000.0 + quote.total_interest)).abs() < 1e-9);
    }

    #[test]
    fn zero_rate_splits_principal_evenly() {
        let quote = calculate(&request(48_000.0, 0.0, 48, 0.0)).unwrap();
        assert_eq!(quote.monthly_payment, 1_000.0);
        assert_eq!(quote.total_interest, 0.0);
        assert_eq!(quote.total_cost, 48_000.0);
    }

    #[test]
    fn fully_paid_upfront_costs_nothing_monthly() {
        let quote = calculate(&request(30_000.0, 30_000.0, 12, 5.0)).unwrap();
        assert_eq!(quote.monthly_payment, 0.0);
        assert_eq!(quote.total_interest, 0.0);
        assert_eq!(quote.total_cost, 30_000.0);
    }

    #[test]
    fn outputs_stay_finite_across_valid_inputs() {
        for price in [0.0, 1.0, 250_000.0, 1e9] {
            for term in [1, 12, 48, 84, 360, 1_200, u32::MAX] {
                for rate in [0.0, 1e-300, 0.01, 3.9, 12.0, 99.0, 10_000.0, 1e6] {
                    let quote = calculate(&request(price, price * 0.1, term, rate)).unwrap();
                    for value in [quote.loan_amount, quote.monthly_payment, quote.total_interest, quote.total_cost] {
                        assert!(value.is_finite() && value >= 0.0, "price {price} term {term} rate {rate}: {value}");
                    }
                    assert!(quote.total_cost >= price);
                }
            }
        }
    }

    #[test]
    fn extreme_rates_converge_to_interest_only_payment() {
        let quote = calculate(&request(100_000.0, 0.0, 360, 10_000.0)).unwrap();
        let monthly_rate = 10_000.0 / 100.0 / 12.0;
        assert!((quote.monthly_payment - 100_000.0 * monthly_rate).abs() < 1e-6);
        assert!(quote.total_interest > 0.0);
        assert!((quote.total_cost - (100_000.0 + quote.total_interest)).abs() < 1e-3);
    }

    #[test]
    fn unrepresentable_totals_are_reported() {
        assert_eq!(
            calculate(&request(f64::MAX, 0.0, 48, 3.9)),
            Err(FinanceError::OutOfRange { price: f64::MAX, annual_rate_percent: 3.9 })
        );
        assert!(matches!(
            calculate(&request(250_000.0, 0.0, 48, f64::MAX)),
            Err(FinanceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert_eq!(calculate(&request(-1.0, 0.0, 12, 3.9)), Err(FinanceError::InvalidPrice(-1.0)));
        assert!(matches!(
            calculate(&request(10_000.0, 12_000.0, 12, 3.9)),
            Err(FinanceError::InvalidDownPayment { .. })
        ));
        assert!(matches!(
            calculate(&request(10_000.0, -5.0, 12, 3.9)),
            Err(FinanceError::InvalidDownPayment { .. })
        ));
        assert_eq!(calculate(&request(10_000.0, 0.0, 0, 3.9)), Err(FinanceError::ZeroTerm));
        assert_eq!(calculate(&request(10_000.0, 0.0, 12, -0.5)), Err(FinanceError::InvalidRate(-0.5)));
        assert!(calculate(&request(f64::NAN, 0.0, 12, 3.9)).is_err());
    }

    #[test]
    fn defaults_take_a_fifth_down() {
        let defaults = LoanRequest::with_defaults(123_456.0);
        assert_eq!(defaults.down_payment, 24_691.0);
        assert_eq!(defaults.term_months, 48);
        assert_eq!(defaults.annual_rate_percent, 3.9);
        assert!(quick_quote(123_456.0).unwrap().monthly_payment > 0.0);
    }
}
