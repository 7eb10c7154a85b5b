//! Arithmetic problem generation.

use mathduel_protocol::{Operator, Problem};
use rand::Rng;

/// Smallest operand.
pub const MIN_OPERAND: i32 = 10;
/// Largest operand.
pub const MAX_OPERAND: i32 = 99;

/// Generates `count` two-digit addition/subtraction problems.
///
/// Operands are uniform in `10..=99` and the operator is a fair coin. For
/// subtraction the operands are ordered so the answer is never negative.
pub fn generate<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<Problem> {
    (0..count)
        .map(|_| {
            let a = rng.random_range(MIN_OPERAND..=MAX_OPERAND);
            let b = rng.random_range(MIN_OPERAND..=MAX_OPERAND);
            if rng.random_bool(0.5) {
                Problem::new(a, Operator::Add, b)
            } else {
                Problem::new(a.max(b), Operator::Sub, a.min(b))
            }
        })
        .collect()
}

/// [`generate`] with the thread-local RNG.
pub fn generate_default(count: usize) -> Vec<Problem> {
    generate(count, &mut rand::rng())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_generate_returns_requested_count() {
        assert_eq!(generate_default(200).len(), 200);
        assert!(generate_default(0).is_empty());
    }

    #[test]
    fn test_operands_in_range_and_answers_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        for p in generate(1_000, &mut rng) {
            assert!((MIN_OPERAND..=MAX_OPERAND).contains(&p.a), "{p}");
            assert!((MIN_OPERAND..=MAX_OPERAND).contains(&p.b), "{p}");
            assert_eq!(p.answer, p.op.apply(p.a, p.b));
        }
    }

    #[test]
    fn test_subtraction_never_negative() {
        let mut rng = StdRng::seed_from_u64(11);
        let subs: Vec<_> = generate(1_000, &mut rng)
            .into_iter()
            .filter(|p| p.op == Operator::Sub)
            .collect();
        assert!(!subs.is_empty());
        assert!(subs.iter().all(|p| p.answer >= 0 && p.a >= p.b));
    }

    #[test]
    fn test_both_operators_appear() {
        let mut rng = StdRng::seed_from_u64(3);
        let problems = generate(200, &mut rng);
        assert!(problems.iter().any(|p| p.op == Operator::Add));
        assert!(problems.iter().any(|p| p.op == Operator::Sub));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = generate(50, &mut StdRng::seed_from_u64(42));
        let b = generate(50, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
