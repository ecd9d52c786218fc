//! Health classification for an Active cutover.

/// Counts observed over one lookback window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSample {
    /// Runs of the primary (v4) workflow.
    pub total: u64,
    /// Failed runs of the primary workflow.
    pub failed: u64,
    /// Runs of the failover workflow.
    pub failovers: u64,
}

impl HealthSample {
    /// Whether the sample meets the alerting threshold.
    ///
    /// Any failover run counts as a breach, whatever the threshold.
    pub fn breaches(&self, failure_threshold: u32) -> bool {
        self.failed >= u64::from(failure_threshold) || self.failovers > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthAssessment {
    pub has_issues: bool,
    pub summary: String,
}

pub struct HealthEvaluator;

impl HealthEvaluator {
    /// Classify a sample. Issues are recorded independently of the alert threshold.
    pub fn evaluate(sample: &HealthSample) -> HealthAssessment {
        HealthAssessment {
            has_issues: sample.failed > 0 || sample.failovers > 0,
            summary: format!("Failures: {}, Failovers: {}", sample.failed, sample.failovers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(failed: u64, failovers: u64) -> HealthSample {
        HealthSample {
            total: 10,
            failed,
            failovers,
        }
    }

    #[test]
    fn clean_sample_has_no_issues() {
        let a = HealthEvaluator::evaluate(&sample(0, 0));
        assert!(!a.has_issues);
        assert_eq!(a.summary, "Failures: 0, Failovers: 0");
    }

    #[test]
    fn any_failure_or_failover_is_an_issue() {
        for (failed, failovers) in [(1, 0), (0, 1), (7, 3)] {
            let a = HealthEvaluator::evaluate(&sample(failed, failovers));
            assert!(a.has_issues, "failed={failed} failovers={failovers}");
        }
        assert_eq!(
            HealthEvaluator::evaluate(&sample(2, 0)).summary,
            "Failures: 2, Failovers: 0"
        );
    }

    #[test]
    fn issues_ignore_threshold_but_breach_does_not() {
        let s = sample(2, 0);
        assert!(HealthEvaluator::evaluate(&s).has_issues);
        assert!(s.breaches(2));
        assert!(!s.breaches(3));
    }

    #[test]
    fn failover_always_breaches() {
        assert!(sample(0, 1).breaches(100));
    }
}
