//! The three-valued static shadow-status lattice used by the instrumenter
//! to decide, for each guest temp and each TS byte, what runtime shadow
//! maintenance to emit.

/// Whether a slot is statically known to carry a shadow, statically known
/// not to, or unknown without runtime information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Every execution reaching this point leaves a live shadow here.
    Shadowed,
    /// Every execution reaching this point leaves no shadow here.
    Unshadowed,
    /// Different executions may or may not leave a shadow here; the
    /// instrumenter must emit a runtime guard.
    Unknown,
}

impl Status {
    /// The lattice meet: `Shadowed ⊔ Unshadowed = Unknown`, `X ⊔ X = X`.
    /// Associative and idempotent, as the spec's design notes require.
    pub fn meet(self, other: Status) -> Status {
        if self == other {
            self
        } else {
            Status::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meet_is_idempotent() {
        for s in [Status::Shadowed, Status::Unshadowed, Status::Unknown] {
            assert_eq!(s.meet(s), s);
        }
    }

    #[test]
    fn meet_of_opposites_is_unknown() {
        assert_eq!(Status::Shadowed.meet(Status::Unshadowed), Status::Unknown);
        assert_eq!(Status::Unshadowed.meet(Status::Shadowed), Status::Unknown);
    }

    #[test]
    fn meet_is_associative() {
        let vals = [Status::Shadowed, Status::Unshadowed, Status::Unknown];
        for a in vals {
            for b in vals {
                for c in vals {
                    assert_eq!(a.meet(b).meet(c), a.meet(b.meet(c)));
                }
            }
        }
    }
}
