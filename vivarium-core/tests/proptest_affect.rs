//! Property-based tests for the mood and sympathy state machines.
//!
//! These pin the structural invariants under arbitrary inputs:
//!   - a mood transition always yields a non-negative distribution that
//!     sums to exactly 100;
//!   - sympathy never escapes [-10, 10] under any update sequence;
//!   - the reciprocal update never exceeds unit magnitude and always
//!     matches the primary delta's sign.

use proptest::prelude::*;

use vivarium_core::mood::Mood;
use vivarium_core::sympathy;

fn arb_mood() -> impl Strategy<Value = Mood> {
    (0u32..200, 0u32..200, 0u32..200, 0u32..200, 0u32..200).prop_map(|(j, a, s, f, n)| {
        Mood::normalized(
            i64::from(j),
            i64::from(a),
            i64::from(s),
            i64::from(f),
            i64::from(n),
        )
    })
}

// ---------------------------------------------------------------------------
// Property: every mood transition is a valid distribution
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn mood_transitions_sum_to_100(mood in arb_mood(), event in ".{0,120}") {
        let after = mood.lexical_transition(&event);
        prop_assert_eq!(after.total(), 100);
    }

    #[test]
    fn normalized_always_sums_to_100(
        j in -500i64..500,
        a in -500i64..500,
        s in -500i64..500,
        f in -500i64..500,
        n in -500i64..500,
    ) {
        let mood = Mood::normalized(j, a, s, f, n);
        prop_assert_eq!(mood.total(), 100);
    }
}

// ---------------------------------------------------------------------------
// Property: sympathy stays bounded under arbitrary update sequences
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn sympathy_stays_in_range(deltas in prop::collection::vec(-2i32..=2, 0..64)) {
        let mut value = 0;
        for delta in deltas {
            value = sympathy::apply_delta(value, delta).0;
            prop_assert!((-10..=10).contains(&value), "escaped range: {}", value);
        }
    }

    #[test]
    fn lexical_delta_is_bounded(message in ".{0,200}") {
        let delta = sympathy::lexical_delta(&message);
        prop_assert!((-2..=2).contains(&delta));
    }

    #[test]
    fn reciprocal_is_unit_and_sign_matched(delta in -2i32..=2) {
        let reciprocal = sympathy::reciprocal_delta(delta);
        prop_assert!(reciprocal.abs() <= 1);
        prop_assert_eq!(reciprocal.signum(), delta.signum());
    }
}

// ---------------------------------------------------------------------------
// Property: threshold events fire only on genuine crossings
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn crossings_only_at_the_boundary(current in -10i32..=10, delta in -2i32..=2) {
        let (updated, crossing) = sympathy::apply_delta(current, delta);
        match crossing {
            Some(sympathy::Crossing::StartsTrusting) => {
                prop_assert!(current < 4 && updated >= 4);
            }
            Some(sympathy::Crossing::GrowsHostile) => {
                prop_assert!(current > -4 && updated <= -4);
            }
            None => {
                let trust_crossed = current < 4 && updated >= 4;
                let hostile_crossed = current > -4 && updated <= -4;
                prop_assert!(!trust_crossed && !hostile_crossed);
            }
        }
    }

    #[test]
    fn drift_shrinks_magnitude(current in -10i32..=10) {
        let drifted = sympathy::drift_step(current);
        prop_assert!(drifted.abs() <= current.abs());
        if current != 0 {
            prop_assert_eq!(drifted.abs(), current.abs() - 1);
        }
    }
}
