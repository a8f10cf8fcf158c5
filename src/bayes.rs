//! Bayes factor bounds
//!
//! Converts frequentist p-values into an upper bound on the Bayes factor
//! against a point null, `1 / (-e p ln p)`, and expresses it as decimal odds
//! and hypothesis probabilities.

use std::f64::consts::E;

use crate::error::ReportError;
use crate::types::BayesianSummary;

/// p-value at which the favoured hypothesis flips
pub const CROSSOVER_P: f64 = 0.36;

/// Bayes factor upper bound `1 / (-e p ln p)`.
///
/// Only meaningful below `1/e`; evaluated as-is everywhere else.
pub fn bf_upper_bound(p: f64) -> f64 {
    1.0 / ((-E * p) * p.ln())
}

/// Fractional odds `numerator/denominator` expressed as decimal odds
pub fn fraction_to_decimal_odds(numerator: f64, denominator: f64) -> f64 {
    numerator / denominator + 1.0
}

/// Implied probability of decimal odds, in percent
pub fn decimal_odds_to_percentage(decimal_odds: f64) -> f64 {
    100.0 * (1.0 / decimal_odds)
}

/// Probability to odds, `p / (1 - p)`
pub fn decimal_to_odds(probability: f64) -> f64 {
    probability / (1.0 - probability)
}

/// Bayes factor implied by a z score, `exp(z^2 / 2)`
pub fn z_score_to_bayes_factor(z: f64) -> f64 {
    (z.powi(2) / 2.0).exp()
}

/// Bayes factor implied by a standardized logistic regression coefficient
pub fn logistic_to_bayes_factor(coefficient: f64) -> f64 {
    (coefficient.powi(2) / 2.0).exp()
}

/// Compute the Bayes factor bound summary for a p-value in (0, 1].
///
/// Odds are stated in favour of the null. At and above [`CROSSOVER_P`] the
/// probabilities swap sides and the bound is reported negative, marking that
/// the evidence now favours the null.
pub fn bayes_factor_upper_bound(p: f64) -> Result<BayesianSummary, ReportError> {
    if !(p > 0.0 && p <= 1.0) {
        return Err(ReportError::InvalidPValue(p));
    }

    let bfb = bf_upper_bound(p);
    let odds = fraction_to_decimal_odds(bfb, 1.0);
    let percentage = decimal_odds_to_percentage(odds);

    let (bfb, null_probability, alternative_probability) = if p >= CROSSOVER_P {
        (-bfb.abs(), 100.0 - percentage, percentage)
    } else {
        (bfb, percentage, 100.0 - percentage)
    };

    Ok(BayesianSummary {
        bfb,
        odds,
        null_probability: round_dp(null_probability, 4),
        alternative_probability: round_dp(alternative_probability, 4),
    })
}

fn round_dp(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
