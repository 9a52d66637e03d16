use crate::state::TeamStats;

const BASE_RATING: f64 = 1500.0;

#[derive(Debug, Clone, Copy)]
pub struct EloConfig {
    pub k: f64,
    pub home_adv_pts: f64,
    /// Rating points per goal of average goal difference.
    pub goal_diff_pts: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 20.0,
            home_adv_pts: 60.0,
            goal_diff_pts: 50.0,
        }
    }
}

/// Elo-like rating from a trailing form string: the results are replayed
/// oldest-first against a baseline opponent, then shifted by the team's
/// average goal difference.
pub fn rating_from_form(stats: &TeamStats, cfg: EloConfig) -> f64 {
    let mut rating = BASE_RATING;
    for letter in stats.form.chars().rev() {
        let Some(score) = result_score(letter) else {
            continue;
        };
        let expected = expected_score(rating, BASE_RATING);
        rating += cfg.k * (score - expected);
    }
    let goal_diff = (stats.goals_for - stats.goals_against).clamp(-3.0, 3.0);
    rating + cfg.goal_diff_pts * goal_diff
}

/// Recency-weighted share of available points, 0..=100. Empty form is 50.
pub fn form_score(form: &str) -> f64 {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for (k, letter) in form
        .chars()
        .filter(|c| result_score(*c).is_some())
        .enumerate()
    {
        let points = match letter.to_ascii_uppercase() {
            'W' => 3.0,
            'D' => 1.0,
            _ => 0.0,
        };
        let w = 0.85_f64.powi(k as i32);
        weighted += w * points;
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        return 50.0;
    }
    weighted / (3.0 * weight_sum) * 100.0
}

pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-(r_a - r_b) / 400.0))
}

fn result_score(letter: char) -> Option<f64> {
    match letter.to_ascii_uppercase() {
        'W' => Some(1.0),
        'D' => Some(0.5),
        'L' => Some(0.0),
        _ => None,
    }
}
