//! Strategies for choosing among the terms a server offers.

use pay402_types::PaymentRequirements;

/// Picks one requirement out of a challenge's `accepts` list.
///
/// Returning `None` means nothing in the list is acceptable and the request
/// fails without a payment attempt.
pub trait RequirementSelector: Send + Sync {
    fn select<'a>(&self, accepts: &'a [PaymentRequirements]) -> Option<&'a PaymentRequirements>;
}

/// Takes the first offered requirement. This is the default: servers list
/// their preferred terms first.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAccepted;

impl RequirementSelector for FirstAccepted {
    fn select<'a>(&self, accepts: &'a [PaymentRequirements]) -> Option<&'a PaymentRequirements> {
        accepts.first()
    }
}

/// Takes the requirement with the lowest amount, ignoring that amounts in
/// different assets are not directly comparable. Useful when all offered
/// terms denominate in one asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheapestAccepted;

impl RequirementSelector for CheapestAccepted {
    fn select<'a>(&self, accepts: &'a [PaymentRequirements]) -> Option<&'a PaymentRequirements> {
        accepts.iter().min_by_key(|req| req.max_amount_required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pay402_types::{AssetId, Scheme};

    fn requirement(amount: &str) -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: "localnet".into(),
            max_amount_required: amount.parse().unwrap(),
            resource: "http://localhost/premium".parse().unwrap(),
            description: String::new(),
            pay_to: "merchant-1".parse().unwrap(),
            max_timeout_seconds: 60,
            asset: AssetId::native(),
            output_schema: None,
            extra: None,
        }
    }

    #[test]
    fn first_accepted_respects_server_order() {
        let accepts = vec![requirement("500"), requirement("100")];
        let selected = FirstAccepted.select(&accepts).unwrap();
        assert_eq!(selected.max_amount_required, "500".parse().unwrap());
    }

    #[test]
    fn cheapest_accepted_picks_the_minimum() {
        let accepts = vec![requirement("500"), requirement("100"), requirement("900")];
        let selected = CheapestAccepted.select(&accepts).unwrap();
        assert_eq!(selected.max_amount_required, "100".parse().unwrap());
    }

    #[test]
    fn empty_accepts_selects_nothing() {
        assert!(FirstAccepted.select(&[]).is_none());
        assert!(CheapestAccepted.select(&[]).is_none());
    }
}
