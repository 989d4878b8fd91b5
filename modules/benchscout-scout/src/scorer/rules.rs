//! Deterministic fallback scorer, used when the model endpoint stays
//! unreachable for a candidate. Produces a minimally-valid score set with
//! the fallback marker so downstream invariants hold without the length
//! checks.

use benchscout_common::constants::DEFAULT_TASK_DOMAIN;
use benchscout_common::{RawCandidate, ScoreSet};

pub fn rule_score(candidate: &RawCandidate) -> ScoreSet {
    let activity = match candidate.github_stars {
        Some(stars) if stars >= 1000 => 9.0,
        Some(stars) if stars >= 500 => 7.5,
        Some(stars) if stars >= 100 => 6.0,
        _ => 5.0,
    };

    let mut reproducibility: f64 = 3.0;
    if candidate.github_url.is_some() {
        reproducibility += 3.0;
    }
    if candidate.dataset_url.is_some() {
        reproducibility += 3.0;
    }

    ScoreSet {
        activity,
        activity_reasoning: "rule fallback: star-tier heuristic".into(),
        reproducibility: reproducibility.min(10.0),
        reproducibility_reasoning: "rule fallback: repo/dataset availability".into(),
        license: 5.0,
        license_reasoning: "rule fallback: license unverified".into(),
        novelty: 5.0,
        novelty_reasoning: "rule fallback: novelty unverified".into(),
        relevance: 5.0,
        relevance_reasoning: "rule fallback: relevance unverified".into(),
        tool_reasoning: "rule fallback: classification unavailable".into(),
        task_domain: candidate
            .task_type
            .clone()
            .unwrap_or_else(|| DEFAULT_TASK_DOMAIN.to_string()),
        metrics: candidate.evaluation_metrics.clone(),
        baselines: candidate.raw_baselines.clone(),
        overall_reasoning: "rule fallback scoring (model unavailable)".into(),
        fallback: true,
        ..ScoreSet::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchscout_common::{RawCandidate, ScoreWeights, ScoredCandidate, Source};

    #[test]
    fn star_tiers() {
        let mut c = RawCandidate::new("Some benchmark repo", "https://github.com/a/b", Source::Github);
        for (stars, expected) in [(2000, 9.0), (600, 7.5), (150, 6.0), (10, 5.0)] {
            c.github_stars = Some(stars);
            assert_eq!(rule_score(&c).activity, expected);
        }
        c.github_stars = None;
        assert_eq!(rule_score(&c).activity, 5.0);
    }

    #[test]
    fn reproducibility_bumps_cap_at_ten() {
        let mut c = RawCandidate::new("Some benchmark repo", "https://github.com/a/b", Source::Github);
        assert_eq!(rule_score(&c).reproducibility, 3.0);
        c.github_url = Some("https://github.com/a/b".into());
        assert_eq!(rule_score(&c).reproducibility, 6.0);
        c.dataset_url = Some("https://huggingface.co/datasets/a/b".into());
        assert_eq!(rule_score(&c).reproducibility, 9.0);
    }

    #[test]
    fn fallback_flag_set_and_scores_in_range() {
        let c = RawCandidate::new("Some benchmark repo", "https://github.com/a/b", Source::Github);
        let scores = rule_score(&c);
        assert!(scores.fallback);
        let scored = ScoredCandidate::from_parts(c, scores, &ScoreWeights::default());
        assert!(scored.total_score >= 0.0 && scored.total_score <= 10.0);
    }
}
