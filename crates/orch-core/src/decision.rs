#![forbid(unsafe_code)]
//! Worktree mode decision: shared working copy vs isolated worktree.

const WORKTREE_SCORE_THRESHOLD: i64 = 12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecisionInput {
    pub changed_files: i64,
    pub estimate_minutes: i64,
    pub risk: i64,
    pub parallel_workers: i64,
    pub conflicting_paths: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionResult {
    pub mode: &'static str,
    pub score: i64,
    pub reasons: Vec<String>,
}

/// Score the input and decide the mode. Reasons are emitted in input order,
/// one per contributing factor.
pub fn decide_worktree(input: DecisionInput) -> DecisionResult {
    let mut score = 0i64;
    let mut reasons = Vec::with_capacity(5);

    if input.changed_files > 0 {
        score += input.changed_files;
        reasons.push(format!("changed_files={}", input.changed_files));
    }
    if input.estimate_minutes > 0 {
        let estimate_score = (input.estimate_minutes + 14) / 15;
        score += estimate_score;
        reasons.push(format!(
            "estimate_minutes={}(+{})",
            input.estimate_minutes, estimate_score
        ));
    }
    if input.risk > 0 {
        let risk_score = input.risk * 3;
        score += risk_score;
        reasons.push(format!("risk={}(+{})", input.risk, risk_score));
    }
    if input.parallel_workers > 0 {
        let parallel_score = input.parallel_workers * 2;
        score += parallel_score;
        reasons.push(format!(
            "parallel_workers={}(+{})",
            input.parallel_workers, parallel_score
        ));
    }
    if input.conflicting_paths > 0 {
        let conflict_score = input.conflicting_paths * 2;
        score += conflict_score;
        reasons.push(format!(
            "conflicting_paths={}(+{})",
            input.conflicting_paths, conflict_score
        ));
    }

    let mode = if score >= WORKTREE_SCORE_THRESHOLD {
        "worktree"
    } else {
        "shared"
    };

    DecisionResult {
        mode,
        score,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_change_stays_shared() {
        let result = decide_worktree(DecisionInput {
            changed_files: 2,
            estimate_minutes: 15,
            risk: 1,
            parallel_workers: 1,
            conflicting_paths: 1,
        });
        assert_eq!(result.mode, "shared");
        assert_eq!(result.score, 9);
        assert_eq!(
            result.reasons,
            vec![
                "changed_files=2",
                "estimate_minutes=15(+1)",
                "risk=1(+3)",
                "parallel_workers=1(+2)",
                "conflicting_paths=1(+2)",
            ]
        );
    }

    #[test]
    fn large_change_gets_a_worktree() {
        let result = decide_worktree(DecisionInput {
            changed_files: 6,
            estimate_minutes: 60,
            risk: 2,
            parallel_workers: 2,
            conflicting_paths: 2,
        });
        assert_eq!(result.mode, "worktree");
        assert_eq!(result.score, 24);
    }

    #[test]
    fn threshold_boundary() {
        for (files, expected) in [(11, "shared"), (12, "worktree"), (13, "worktree")] {
            let result = decide_worktree(DecisionInput {
                changed_files: files,
                ..DecisionInput::default()
            });
            assert_eq!(result.score, files);
            assert_eq!(result.mode, expected, "score={files}");
        }
    }

    #[test]
    fn zero_factors_emit_no_reasons() {
        let result = decide_worktree(DecisionInput::default());
        assert_eq!(result.score, 0);
        assert_eq!(result.mode, "shared");
        assert!(result.reasons.is_empty());
    }
}
