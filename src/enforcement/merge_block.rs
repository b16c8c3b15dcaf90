use crate::enforcement::decision::GateOverride;
use crate::enforcement::gates::GateResult;

/// What the gate outcome means for the merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDisposition {
    Pass,
    Overridden(GateOverride),
    Blocked(String),
}

pub struct MergeBlocker;

impl MergeBlocker {
    /// A failed gate blocks unless overrides are allowed and an attributed
    /// override was supplied.
    pub fn disposition(gates: &GateResult, gate_override: Option<&GateOverride>) -> GateDisposition {
        if gates.all_passed {
            return GateDisposition::Pass;
        }

        match gate_override {
            Some(o) if gates.can_override && !o.actor.trim().is_empty() && !o.reason.trim().is_empty() => {
                GateDisposition::Overridden(o.clone())
            }
            _ => GateDisposition::Blocked(Self::get_block_reason(gates, gate_override)),
        }
    }

    pub fn should_block_merge(gates: &GateResult, gate_override: Option<&GateOverride>) -> bool {
        matches!(
            Self::disposition(gates, gate_override),
            GateDisposition::Blocked(_)
        )
    }

    pub fn get_block_reason(gates: &GateResult, gate_override: Option<&GateOverride>) -> String {
        let failed = gates.failed_gates.join(", ");
        if gates.all_passed {
            "All security gates passed".to_string()
        } else if !gates.can_override {
            format!("Security gates failed, override not allowed: {}", failed)
        } else if gate_override.is_none() {
            format!(
                "Security gates failed; override permitted but not requested: {}",
                failed
            )
        } else {
            format!(
                "Security gates failed; override rejected without actor and reason: {}",
                failed
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::gates::Gate;

    fn failed(can_override: bool) -> GateResult {
        GateResult::from_gates(
            vec![Gate {
                name: "testsPass".to_string(),
                required: true,
                passed: false,
                description: String::new(),
            }],
            can_override,
        )
    }

    fn attributed() -> GateOverride {
        GateOverride {
            actor: "alice".to_string(),
            reason: "flaky test infra".to_string(),
        }
    }

    #[test]
    fn test_override_not_allowed() {
        let disposition = MergeBlocker::disposition(&failed(false), Some(&attributed()));
        match disposition {
            GateDisposition::Blocked(reason) => assert!(reason.contains("override not allowed")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_override_applied() {
        assert_eq!(
            MergeBlocker::disposition(&failed(true), Some(&attributed())),
            GateDisposition::Overridden(attributed())
        );
    }

    #[test]
    fn test_override_permitted_but_absent() {
        assert!(MergeBlocker::should_block_merge(&failed(true), None));
        assert!(MergeBlocker::get_block_reason(&failed(true), None)
            .contains("override permitted but not requested"));
    }

    #[test]
    fn test_anonymous_override_rejected() {
        let anonymous = GateOverride {
            actor: " ".to_string(),
            reason: "because".to_string(),
        };
        assert!(MergeBlocker::should_block_merge(&failed(true), Some(&anonymous)));
    }
}
