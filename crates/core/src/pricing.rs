//! Payment plan derivation. Plans are computed on demand and never stored.

use chrono::{Days, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::config::CheckoutPolicy;
use crate::domain::checkout::PaymentType;

/// Days between consecutive installment due dates.
pub const INSTALLMENT_INTERVAL_DAYS: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub number: u32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTerms {
    pub percent: Decimal,
    pub amount: Decimal,
    pub remaining: Decimal,
    pub hold_days: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub payment_type: PaymentType,
    pub periods: u32,
    pub per_period_amount: Decimal,
    pub first_period_amount: Decimal,
    pub fee_amount: Decimal,
    pub total_amount: Decimal,
    pub deposit: Option<DepositTerms>,
    pub schedule: Vec<ScheduledPayment>,
}

/// Whole baht, half away from zero.
fn round_baht(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

fn percent_of(price: Decimal, percent: Decimal) -> Decimal {
    round_baht(price * percent / Decimal::ONE_HUNDRED)
}

fn due_after(today: NaiveDate, days: u64) -> NaiveDate {
    today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

pub fn compute_plan(
    price: Decimal,
    payment_type: PaymentType,
    policy: &CheckoutPolicy,
    today: NaiveDate,
) -> PaymentPlan {
    match payment_type {
        PaymentType::Full => PaymentPlan {
            payment_type,
            periods: 1,
            per_period_amount: price,
            first_period_amount: price,
            fee_amount: Decimal::ZERO,
            total_amount: price,
            deposit: None,
            schedule: vec![ScheduledPayment { number: 1, amount: price, due_date: today }],
        },
        PaymentType::Deposit => {
            let terms = &policy.deposit;
            let amount = percent_of(price, terms.percent);
            let remaining = price - amount;
            PaymentPlan {
                payment_type,
                periods: 1,
                per_period_amount: amount,
                first_period_amount: amount,
                fee_amount: Decimal::ZERO,
                total_amount: price,
                deposit: Some(DepositTerms {
                    percent: terms.percent,
                    amount,
                    remaining,
                    hold_days: terms.hold_days,
                }),
                schedule: vec![
                    ScheduledPayment { number: 1, amount, due_date: today },
                    ScheduledPayment {
                        number: 2,
                        amount: remaining,
                        due_date: due_after(today, u64::from(terms.hold_days)),
                    },
                ],
            }
        }
        PaymentType::Installment => {
            let terms = &policy.installment;
            let periods = terms.periods.max(1);
            let divisor = Decimal::from(periods);
            let fee_amount = percent_of(price, terms.service_fee_percent);
            let per_period_amount = (price / divisor).floor();
            let remainder = price - per_period_amount * divisor;
            let first_period_amount = per_period_amount + fee_amount + remainder;

            let schedule = (1..=periods)
                .map(|number| ScheduledPayment {
                    number,
                    amount: if number == 1 { first_period_amount } else { per_period_amount },
                    due_date: due_after(
                        today,
                        INSTALLMENT_INTERVAL_DAYS * u64::from(number - 1),
                    ),
                })
                .collect();

            PaymentPlan {
                payment_type,
                periods,
                per_period_amount,
                first_period_amount,
                fee_amount,
                total_amount: price + fee_amount,
                deposit: None,
                schedule,
            }
        }
    }
}

/// `฿3,270`, `฿1,250.50`.
pub fn format_baht(amount: Decimal) -> String {
    let amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero).normalize();
    let negative = amount.is_sign_negative() && !amount.is_zero();
    let whole = amount.abs().trunc();
    let fraction = amount.abs() - whole;

    let digits = whole.to_u128().map(|value| value.to_string()).unwrap_or_else(|| whole.to_string());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let mut formatted = String::from(if negative { "-฿" } else { "฿" });
    formatted.push_str(&grouped);
    if !fraction.is_zero() {
        formatted.push_str(&format!("{fraction:.2}")[1..]);
    }
    formatted
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{compute_plan, format_baht};
    use crate::config::CheckoutPolicy;
    use crate::domain::checkout::PaymentType;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date")
    }

    fn baht(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    #[test]
    fn installment_adds_fee_to_first_period() {
        let plan =
            compute_plan(baht(9000), PaymentType::Installment, &CheckoutPolicy::default(), today());

        assert_eq!(plan.periods, 3);
        assert_eq!(plan.fee_amount, baht(270));
        assert_eq!(plan.per_period_amount, baht(3000));
        assert_eq!(plan.first_period_amount, baht(3270));
        assert_eq!(plan.total_amount, baht(9270));
        assert_eq!(plan.schedule.len(), 3);
        assert_eq!(plan.schedule[1].due_date, NaiveDate::from_ymd_opt(2026, 3, 31).expect("date"));
        assert_eq!(plan.schedule[2].due_date, NaiveDate::from_ymd_opt(2026, 4, 30).expect("date"));
    }

    #[test]
    fn installment_remainder_lands_on_first_period() {
        let plan =
            compute_plan(baht(10000), PaymentType::Installment, &CheckoutPolicy::default(), today());

        assert_eq!(plan.per_period_amount, baht(3333));
        assert_eq!(plan.fee_amount, baht(300));
        assert_eq!(plan.first_period_amount, baht(3334 + 300));
        let scheduled: Decimal = plan.schedule.iter().map(|payment| payment.amount).sum();
        assert_eq!(scheduled, plan.total_amount);
    }

    #[test]
    fn fee_rounds_half_away_from_zero() {
        let mut policy = CheckoutPolicy::default();
        policy.installment.service_fee_percent = Decimal::new(25, 1);
        // 2.5% of 1_020 is 25.5
        let plan = compute_plan(baht(1020), PaymentType::Installment, &policy, today());
        assert_eq!(plan.fee_amount, baht(26));
    }

    #[test]
    fn deposit_holds_remaining_balance() {
        let plan = compute_plan(baht(12345), PaymentType::Deposit, &CheckoutPolicy::default(), today());
        let deposit = plan.deposit.expect("deposit terms");

        assert_eq!(deposit.amount, baht(1235));
        assert_eq!(deposit.remaining, baht(11110));
        assert_eq!(deposit.hold_days, 14);
        assert_eq!(plan.schedule[1].due_date, NaiveDate::from_ymd_opt(2026, 3, 15).expect("date"));
    }

    #[test]
    fn full_payment_is_single_period_without_fee() {
        let plan = compute_plan(baht(4500), PaymentType::Full, &CheckoutPolicy::default(), today());
        assert_eq!(plan.periods, 1);
        assert_eq!(plan.fee_amount, Decimal::ZERO);
        assert_eq!(plan.total_amount, baht(4500));
        assert_eq!(plan.schedule.len(), 1);
    }

    #[test]
    fn format_baht_groups_thousands() {
        assert_eq!(format_baht(baht(3270)), "฿3,270");
        assert_eq!(format_baht(baht(150)), "฿150");
        assert_eq!(format_baht(baht(1234567)), "฿1,234,567");
        assert_eq!(format_baht(Decimal::new(125050, 2)), "฿1,250.50");
        assert_eq!(format_baht(Decimal::ZERO), "฿0");
    }

    #[test]
    fn format_baht_carries_rounded_fraction_into_whole_baht() {
        assert_eq!(format_baht(Decimal::new(9_999_999, 3)), "฿10,000");
        assert_eq!(format_baht(Decimal::new(1_234_995, 3)), "฿1,235");
        assert_eq!(format_baht(Decimal::new(1_234_994, 3)), "฿1,234.99");
    }
}
