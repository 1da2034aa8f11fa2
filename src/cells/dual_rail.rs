//! Dual-rail logic cells.

use crate::automaton::{Automaton, TransitionSpec};
use crate::error::SimResult;

use super::Overrides;

/// 2x2 join: combines one dual-rail pulse of `a` and one of `b`.
///
/// The first rail of each operand selects the state; the second fires the
/// output named after the pair of values (`q00` .. `q11`). A second pulse of
/// the same operand before the join completes is an error.
pub fn two_by_two_join(o: &Overrides) -> SimResult<Automaton> {
    let mut builder = Automaton::builder("TWOBYTWOJOIN")
        .inputs(["a_t", "a_f", "b_t", "b_f"])
        .outputs(["q00", "q01", "q10", "q11"])
        .firing_delay(20);

    for rail in ["a_f", "a_t", "b_f", "b_t"] {
        builder = builder.transition(TransitionSpec::new("idle", rail, format!("{}_arrived", rail)));
    }

    // (waiting state, completing rails with their outputs, rails of the same operand)
    let table = [
        ("a_f_arrived", [("b_f", "q00"), ("b_t", "q01")], ["a_f", "a_t"]),
        ("a_t_arrived", [("b_f", "q10"), ("b_t", "q11")], ["a_t", "a_f"]),
        ("b_f_arrived", [("a_f", "q00"), ("a_t", "q10")], ["b_f", "b_t"]),
        ("b_t_arrived", [("a_f", "q01"), ("a_t", "q11")], ["b_f", "b_t"]),
    ];
    for (state, completions, repeats) in table {
        for (rail, output) in completions {
            builder = builder.transition(TransitionSpec::new(state, rail, "idle").fire(output));
        }
        for rail in repeats {
            builder = builder.transition(TransitionSpec::new(state, rail, state).error());
        }
    }

    o.finish(builder, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::TransitionKind;
    use crate::error::CellFault;

    #[test]
    fn test_join_is_complete() {
        let join = two_by_two_join(&Overrides::default()).unwrap();
        assert_eq!(join.states().len(), 5);
        assert!(join.unhandled_pairs().is_empty());
        let errors = join
            .describe()
            .transitions
            .iter()
            .filter(|t| t.kind == TransitionKind::Error)
            .count();
        assert_eq!(errors, 8);
    }

    #[test]
    fn test_join_fires_selected_output() {
        let join = two_by_two_join(&Overrides::default()).unwrap();
        let mut st = join.start();
        // a = true, b = false
        join.step(&mut st, 0, 10).unwrap();
        let step = join.step(&mut st, 3, 12).unwrap();
        assert_eq!(step.firing, vec![(2, 20)]);
        assert_eq!(join.state_name(st.current()), "idle");
    }

    #[test]
    fn test_join_repeated_operand_is_error() {
        let join = two_by_two_join(&Overrides::default()).unwrap();
        let mut st = join.start();
        join.step(&mut st, 1, 0).unwrap();
        let fault = join.step(&mut st, 0, 1).unwrap_err();
        assert!(matches!(fault, CellFault::ErrorTransition { .. }));
    }
}
