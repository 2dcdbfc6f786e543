use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Repayment terms proposed on every call, fixed for the lifetime of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentOffer {
    pub amount_owed: Decimal,
    pub monthly_payment: Decimal,
    pub months: u32,
}

impl Default for RepaymentOffer {
    fn default() -> Self {
        Self { amount_owed: Decimal::new(1_000, 0), monthly_payment: Decimal::new(200, 0), months: 5 }
    }
}

impl RepaymentOffer {
    /// Short label persisted as the record's offered plan, e.g. `$200/month for 5 months`.
    pub fn plan_label(&self) -> String {
        format!("{}/month for {}", spoken_amount(self.monthly_payment), self.months_phrase())
    }

    pub fn opening_script(&self) -> String {
        format!(
            "Hello, this is a courtesy call regarding your outstanding balance of {}. \
             We'd like to propose a payment plan of {} per month for {}. \
             Would this arrangement work for you?",
            spoken_amount(self.amount_owed),
            spoken_amount(self.monthly_payment),
            self.months_phrase()
        )
    }

    pub fn repeat_script(&self) -> String {
        format!(
            "Of course. You currently owe {}. \
             We're proposing a payment plan of {} per month for {}. \
             This would clear your balance. Would you like to accept this plan?",
            spoken_amount(self.amount_owed),
            spoken_amount(self.monthly_payment),
            self.months_phrase()
        )
    }

    pub fn acceptance_script(&self) -> String {
        format!(
            "Excellent! We've confirmed your payment plan of {} per month for {}. \
             You'll receive a confirmation by text message shortly. Thank you!",
            spoken_amount(self.monthly_payment),
            self.months_phrase()
        )
    }

    pub fn escalation_script(&self) -> &'static str {
        "I understand. Let me connect you with a specialist who can discuss alternative payment arrangements. Please hold."
    }

    pub fn retry_limit_script(&self) -> &'static str {
        "I want to make sure we get this right. Let me connect you with a specialist who can go over your options. Please hold."
    }

    /// Spoken when the caller says nothing at all.
    pub fn goodbye_script(&self) -> &'static str {
        "We didn't catch your response. We'll follow up with you shortly. Goodbye."
    }

    /// Spoken by the gateway when the opening gather collects no speech.
    pub fn opening_fallback_script(&self) -> &'static str {
        "We didn't receive a response. We'll follow up with you shortly. Goodbye."
    }

    pub fn repeat_fallback_script(&self) -> &'static str {
        "We'll follow up with you shortly. Goodbye."
    }

    /// Spoken when a turn could not be recorded.
    pub fn hold_script(&self) -> &'static str {
        "We're sorry, we're having trouble processing your response right now. \
         Please hold, or we'll follow up with you shortly. Goodbye."
    }

    fn months_phrase(&self) -> String {
        if self.months == 1 {
            "1 month".to_string()
        } else {
            format!("{} months", self.months)
        }
    }
}

/// Renders an amount the way a voice prompt reads it: `$1,000` or `$1,250.50`.
pub fn spoken_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let whole = rounded.trunc();
    let cents = ((rounded - whole) * Decimal::ONE_HUNDRED).abs().to_u32().unwrap_or(0);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let grouped = group_thousands(&whole.abs().normalize().to_string());

    if cents == 0 {
        format!("{sign}${grouped}")
    } else {
        format!("{sign}${grouped}.{cents:02}")
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{spoken_amount, RepaymentOffer};

    #[test]
    fn default_offer_matches_call_script_terms() {
        let offer = RepaymentOffer::default();

        assert_eq!(offer.plan_label(), "$200/month for 5 months");
        assert!(offer.opening_script().contains("outstanding balance of $1,000."));
        assert!(offer.opening_script().contains("$200 per month for 5 months"));
        assert!(offer.repeat_script().starts_with("Of course. You currently owe $1,000."));
        assert!(offer.acceptance_script().starts_with("Excellent! We've confirmed"));
    }

    #[test]
    fn spoken_amount_groups_thousands_and_keeps_cents() {
        assert_eq!(spoken_amount(Decimal::new(1_000, 0)), "$1,000");
        assert_eq!(spoken_amount(Decimal::new(125_050, 2)), "$1,250.50");
        assert_eq!(spoken_amount(Decimal::new(99, 0)), "$99");
        assert_eq!(spoken_amount(Decimal::new(1_234_567, 0)), "$1,234,567");
        assert_eq!(spoken_amount(Decimal::new(20_000, 2)), "$200");
    }

    #[test]
    fn single_month_is_not_pluralized() {
        let offer = RepaymentOffer {
            amount_owed: Decimal::new(300, 0),
            monthly_payment: Decimal::new(300, 0),
            months: 1,
        };

        assert_eq!(offer.plan_label(), "$300/month for 1 month");
    }
}
