//! Problem Generation
//!
//! Random arithmetic questions over two operands in [1, 20].

use crate::core::rng::DeterministicRng;

/// Smallest operand drawn.
pub const OPERAND_MIN: i64 = 1;

/// Largest operand drawn.
pub const OPERAND_MAX: i64 = 20;

// =============================================================================
// OPERATOR
// =============================================================================

/// Arithmetic operator of a problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    /// `a + b`
    Add,
    /// `a - b`, with `a >= b`
    Subtract,
    /// `a × b`
    Multiply,
}

impl Operator {
    /// All operators, drawn uniformly.
    pub const ALL: [Operator; 3] = [Operator::Add, Operator::Subtract, Operator::Multiply];

    /// Symbol used in the question text.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "\u{00D7}",
        }
    }

    /// Apply the operator.
    #[inline]
    pub fn apply(self, a: i64, b: i64) -> i64 {
        match self {
            Operator::Add => a + b,
            Operator::Subtract => a - b,
            Operator::Multiply => a * b,
        }
    }
}

// =============================================================================
// PROBLEM
// =============================================================================

/// A question and its integer answer. Replaced wholesale each round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Problem {
    /// Human-readable question, e.g. `"7 + 3"`.
    pub question: String,
    /// Correct answer.
    pub answer: i64,
}

impl Problem {
    /// Build a problem from an operator and operands.
    ///
    /// Subtraction operands are reordered so the answer is never negative.
    pub fn new(op: Operator, a: i64, b: i64) -> Self {
        let (a, b) = match op {
            Operator::Subtract => (a.max(b), a.min(b)),
            _ => (a, b),
        };

        Self {
            question: format!("{} {} {}", a, op.symbol(), b),
            answer: op.apply(a, b),
        }
    }

    /// Whether a submitted number equals the answer.
    ///
    /// Submissions arrive as JSON numbers, so `10.0` matches `10` and any
    /// fractional value is wrong.
    pub fn is_correct(&self, value: f64) -> bool {
        value == self.answer as f64
    }
}

/// Generate a random problem.
pub fn generate(rng: &mut DeterministicRng) -> Problem {
    let op = Operator::ALL[rng.next_int(Operator::ALL.len() as u32) as usize];
    let a = rng.next_int_range(OPERAND_MIN, OPERAND_MAX);
    let b = rng.next_int_range(OPERAND_MIN, OPERAND_MAX);
    Problem::new(op, a, b)
}

// =============================================================================
// PROBLEM SOURCE
// =============================================================================

/// Supplier of problems for a game.
pub trait ProblemSource: Send {
    /// Produce the next problem.
    fn next_problem(&mut self) -> Problem;
}

/// Random problems from a seeded generator.
#[derive(Clone, Debug)]
pub struct RandomProblems {
    rng: DeterministicRng,
}

impl RandomProblems {
    /// Create a source with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: DeterministicRng::new(seed),
        }
    }

    /// Create a source from an existing RNG.
    pub fn from_rng(rng: DeterministicRng) -> Self {
        Self { rng }
    }
}

impl ProblemSource for RandomProblems {
    fn next_problem(&mut self) -> Problem {
        generate(&mut self.rng)
    }
}

impl<S: ProblemSource + ?Sized> ProblemSource for Box<S> {
    fn next_problem(&mut self) -> Problem {
        (**self).next_problem()
    }
}
