//! Phase observations and the expectations checked against them.
//!
//! A phase query (`kubectl get pods -o jsonpath={.items[*].status.phase}`)
//! prints one token per pod, so the snapshot doubles as a pod count.

use std::fmt;

use deploycheck_core::types::PodPhase;

/// Phases of the pods matched by one query, in query order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseSnapshot {
    phases: Vec<PodPhase>,
}

impl PhaseSnapshot {
    /// Parses whitespace-separated phase tokens.
    pub fn parse(stdout: &str) -> Self {
        Self {
            phases: stdout.split_whitespace().map(PodPhase::parse).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// True when there is at least one pod and every pod is in `phase`.
    pub fn all_in(&self, phase: &PodPhase) -> bool {
        !self.phases.is_empty() && self.phases.iter().all(|p| p == phase)
    }

    pub fn any_in(&self, phase: &PodPhase) -> bool {
        self.phases.iter().any(|p| p == phase)
    }

    pub fn count(&self, phase: &PodPhase) -> usize {
        self.phases.iter().filter(|p| *p == phase).count()
    }
}

impl fmt::Display for PhaseSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.phases.is_empty() {
            return f.write_str("<no pods>");
        }
        for (i, phase) in self.phases.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{phase}")?;
        }
        Ok(())
    }
}

/// Condition on the phases of the matched pods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseRule {
    /// Every pod (and at least one) is in the phase
    All(PodPhase),
    /// At least one pod is in the phase
    Any(PodPhase),
}

/// Condition on the number of matched pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountRule {
    AtLeast(usize),
    Exactly(usize),
}

/// What a wait is waiting for. Both parts must hold; an empty expectation is
/// met by any snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitExpectation {
    pub phase: Option<PhaseRule>,
    pub count: Option<CountRule>,
}

impl UnitExpectation {
    pub fn all_running() -> Self {
        Self {
            phase: Some(PhaseRule::All(PodPhase::Running)),
            count: None,
        }
    }

    pub fn any_running() -> Self {
        Self {
            phase: Some(PhaseRule::Any(PodPhase::Running)),
            count: None,
        }
    }

    pub fn count(rule: CountRule) -> Self {
        Self {
            phase: None,
            count: Some(rule),
        }
    }

    pub fn with_count(mut self, rule: CountRule) -> Self {
        self.count = Some(rule);
        self
    }

    pub fn is_met(&self, snapshot: &PhaseSnapshot) -> bool {
        let phase_ok = match &self.phase {
            Some(PhaseRule::All(phase)) => snapshot.all_in(phase),
            Some(PhaseRule::Any(phase)) => snapshot.any_in(phase),
            None => true,
        };
        let count_ok = match self.count {
            Some(CountRule::AtLeast(n)) => snapshot.len() >= n,
            Some(CountRule::Exactly(n)) => snapshot.len() == n,
            None => true,
        };
        phase_ok && count_ok
    }
}

impl fmt::Display for UnitExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match &self.phase {
            Some(PhaseRule::All(phase)) => Some(format!("all pods {phase}")),
            Some(PhaseRule::Any(phase)) => Some(format!("any pod {phase}")),
            None => None,
        };
        let count = match self.count {
            Some(CountRule::AtLeast(n)) => Some(format!("at least {n} pods")),
            Some(CountRule::Exactly(n)) => Some(format!("exactly {n} pods")),
            None => None,
        };
        match (phase, count) {
            (Some(p), Some(c)) => write!(f, "{p} ({c})"),
            (Some(p), None) => f.write_str(&p),
            (None, Some(c)) => f.write_str(&c),
            (None, None) => f.write_str("any pod state"),
        }
    }
}

/// Names printed by a name query, in query order.
pub fn parse_names(stdout: &str) -> Vec<String> {
    stdout.split_whitespace().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_any_whitespace() {
        let snap = PhaseSnapshot::parse("Running  Pending\nRunning\n");
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.count(&PodPhase::Running), 2);
    }

    #[test]
    fn all_in_requires_nonempty() {
        let empty = PhaseSnapshot::parse("");
        assert!(empty.is_empty());
        assert!(!empty.all_in(&PodPhase::Running));
        assert!(!empty.any_in(&PodPhase::Running));
    }

    #[test]
    fn all_in_rejects_mixed() {
        let snap = PhaseSnapshot::parse("Running Pending");
        assert!(!snap.all_in(&PodPhase::Running));
        assert!(snap.any_in(&PodPhase::Running));
    }

    #[test]
    fn running_substring_is_not_a_phase() {
        // tokens must match exactly, not by substring
        let snap = PhaseSnapshot::parse("NotRunning");
        assert!(!snap.any_in(&PodPhase::Running));
    }

    #[test]
    fn snapshot_display() {
        assert_eq!(PhaseSnapshot::parse("").to_string(), "<no pods>");
        assert_eq!(
            PhaseSnapshot::parse("Running Pending").to_string(),
            "Running Pending"
        );
    }

    #[test]
    fn expectation_all_running_with_exact_count() {
        let exp = UnitExpectation::all_running().with_count(CountRule::Exactly(2));
        assert!(exp.is_met(&PhaseSnapshot::parse("Running Running")));
        assert!(!exp.is_met(&PhaseSnapshot::parse("Running Running Running")));
        assert!(!exp.is_met(&PhaseSnapshot::parse("Running Pending")));
    }

    #[test]
    fn expectation_count_only() {
        let at_least = UnitExpectation::count(CountRule::AtLeast(3));
        assert!(!at_least.is_met(&PhaseSnapshot::parse("Running Running")));
        assert!(at_least.is_met(&PhaseSnapshot::parse("Running Pending Pending Running")));

        let exactly = UnitExpectation::count(CountRule::Exactly(1));
        assert!(exactly.is_met(&PhaseSnapshot::parse("Running")));
        assert!(!exactly.is_met(&PhaseSnapshot::parse("")));
    }

    #[test]
    fn empty_expectation_is_always_met() {
        assert!(UnitExpectation::default().is_met(&PhaseSnapshot::parse("")));
    }

    #[test]
    fn expectation_display() {
        assert_eq!(UnitExpectation::all_running().to_string(), "all pods Running");
        assert_eq!(
            UnitExpectation::any_running()
                .with_count(CountRule::AtLeast(3))
                .to_string(),
            "any pod Running (at least 3 pods)"
        );
        assert_eq!(
            UnitExpectation::count(CountRule::Exactly(1)).to_string(),
            "exactly 1 pods"
        );
    }

    #[test]
    fn parse_names_in_order() {
        assert_eq!(parse_names("a-1 b-2\n"), vec!["a-1", "b-2"]);
        assert!(parse_names("  ").is_empty());
    }
}
