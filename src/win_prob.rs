use crate::state::ModelProbabilities;

/// Independent-Poisson scoreline distribution for one match.
#[derive(Debug, Clone)]
pub struct ScoreGrid {
    pmf_home: Vec<f64>,
    pmf_away: Vec<f64>,
    lambda_home: f64,
    lambda_away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scoreline {
    pub home: u32,
    pub away: u32,
    pub probability: f64,
}

impl ScoreGrid {
    pub fn new(lambda_home: f64, lambda_away: f64, max_goals: u32) -> Self {
        Self {
            pmf_home: poisson_pmf(lambda_home, max_goals),
            pmf_away: poisson_pmf(lambda_away, max_goals),
            lambda_home: lambda_home.max(0.0),
            lambda_away: lambda_away.max(0.0),
        }
    }

    /// (home, draw, away) as fractions summing to 1.
    pub fn outcome_probs(&self) -> (f64, f64, f64) {
        let mut p_home = 0.0;
        let mut p_draw = 0.0;
        let mut p_away = 0.0;
        for (i, p_i) in self.pmf_home.iter().enumerate() {
            for (j, p_j) in self.pmf_away.iter().enumerate() {
                let p = p_i * p_j;
                if i > j {
                    p_home += p;
                } else if i < j {
                    p_away += p;
                } else {
                    p_draw += p;
                }
            }
        }

        // Guard against tiny float drift.
        let sum = p_home + p_draw + p_away;
        if sum > 0.0 {
            (p_home / sum, p_draw / sum, p_away / sum)
        } else {
            (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)
        }
    }

    /// Both teams score at least once.
    pub fn btts(&self) -> f64 {
        let home_blank = (-self.lambda_home).exp();
        let away_blank = (-self.lambda_away).exp();
        ((1.0 - home_blank) * (1.0 - away_blank)).clamp(0.0, 1.0)
    }

    /// Total goals strictly above `line` (e.g. 2.5).
    pub fn over(&self, line: f64) -> f64 {
        let total = self.lambda_home + self.lambda_away;
        let max_under = line.floor().max(0.0) as u32;
        let under: f64 = poisson_pmf_exact(total, max_under).iter().sum();
        (1.0 - under).clamp(0.0, 1.0)
    }

    /// Most probable exact score. Equal probabilities prefer a scoreline with
    /// `home >= away`, then the lower total.
    pub fn most_likely(&self) -> Scoreline {
        let mut best = Scoreline {
            home: 0,
            away: 0,
            probability: -1.0,
        };
        for (i, p_i) in self.pmf_home.iter().enumerate() {
            for (j, p_j) in self.pmf_away.iter().enumerate() {
                let candidate = Scoreline {
                    home: i as u32,
                    away: j as u32,
                    probability: p_i * p_j,
                };
                if beats(&candidate, &best) {
                    best = candidate;
                }
            }
        }
        best
    }
}

fn beats(candidate: &Scoreline, best: &Scoreline) -> bool {
    const EPS: f64 = 1e-12;
    if candidate.probability > best.probability + EPS {
        return true;
    }
    if (candidate.probability - best.probability).abs() > EPS {
        return false;
    }
    let cand_home_side = candidate.home >= candidate.away;
    let best_home_side = best.home >= best.away;
    if cand_home_side != best_home_side {
        return cand_home_side;
    }
    candidate.home + candidate.away < best.home + best.away
}

/// Poisson probabilities for 0..=max_k with the tail folded into the last
/// bucket so the vector sums to 1.
pub fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let mut out = poisson_pmf_exact(lambda, max_k);
    let sum: f64 = out.iter().sum();
    if sum < 1.0
        && let Some(last) = out.last_mut()
    {
        *last += 1.0 - sum;
    }
    out
}

fn poisson_pmf_exact(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let lambda = lambda.max(0.0);
    let mut out = vec![0.0; max_k + 1];
    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }
    out
}

/// Converts fractions to percentages rounded to one decimal, putting the
/// rounding residue into the draw so the triple always sums to 100.
pub fn to_percentages(p_home: f64, p_draw: f64, p_away: f64) -> ModelProbabilities {
    let sum = (p_home + p_draw + p_away).max(1e-9);
    let home = round1(p_home / sum * 100.0);
    let away = round1(p_away / sum * 100.0);
    let draw = round1((100.0 - home - away).max(0.0));
    ModelProbabilities {
        home_win: home,
        draw,
        away_win: away,
    }
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pmf_sums_to_one_and_decreases_past_mode() {
        let pmf = poisson_pmf(1.3, 10);
        let sum: f64 = pmf.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        for k in 2..8 {
            assert!(pmf[k] > pmf[k + 1]);
        }
    }

    #[test]
    fn stronger_home_side_is_favoured() {
        let grid = ScoreGrid::new(2.2, 0.8, 10);
        let (h, d, a) = grid.outcome_probs();
        assert!(h > a);
        assert!(h > d);
        assert!((h + d + a - 1.0).abs() < 1e-9);
    }

    #[test]
    fn symmetric_lambdas_tie_break_to_home_side() {
        // With equal lambdas 1-0 and 0-1 are equally likely; 1-1 or 0-0 may
        // lead, but whatever wins must not be an away-side score.
        let grid = ScoreGrid::new(1.0, 1.0, 10);
        let best = grid.most_likely();
        assert!(best.home >= best.away);
    }

    #[test]
    fn tie_break_prefers_home_over_away_score() {
        let a = Scoreline { home: 0, away: 1, probability: 0.2 };
        let b = Scoreline { home: 1, away: 0, probability: 0.2 };
        assert!(beats(&b, &a));
        assert!(!beats(&a, &b));
    }

    #[test]
    fn low_scoring_lambdas_favour_under() {
        let grid = ScoreGrid::new(0.6, 0.5, 10);
        assert!(grid.over(2.5) < 0.2);
        assert!(grid.btts() < 0.3);
        let best = grid.most_likely();
        assert_eq!((best.home, best.away), (0, 0));
    }

    #[test]
    fn percentages_sum_to_exactly_100() {
        let p = to_percentages(0.4567, 0.2711, 0.2722);
        assert!((p.total() - 100.0).abs() < 1e-9);
        assert!(p.home_win >= 0.0 && p.draw >= 0.0 && p.away_win >= 0.0);
    }
}
