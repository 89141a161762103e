//! Classical multi-succedent sequent calculus.
//!
//! Every rule acts on the first goal of the stack and, within that goal, on
//! the head assumption or the head conclusion:
//!
//! ```text
//! ---------- (I)          Γ ⊢ A, Δ    A, Γ ⊢ Δ
//!   A ⊢ A                 -------------------- (Cut A)
//!                                Γ ⊢ Δ
//!
//!   A, Γ ⊢ Δ                 Γ ⊢ A, Δ    Γ ⊢ B, Δ
//! -------------- (AndL1)     -------------------- (AndR)
//! A ∧ B, Γ ⊢ Δ                   Γ ⊢ A ∧ B, Δ
//!
//! A, Γ ⊢ Δ    B, Γ ⊢ Δ            Γ ⊢ A, Δ
//! -------------------- (OrL)    ------------- (OrR1)
//!    A ∨ B, Γ ⊢ Δ               Γ ⊢ A ∨ B, Δ
//!
//! Γ ⊢ A, Δ    B, Γ ⊢ Δ            A, Γ ⊢ B, Δ
//! -------------------- (ImpL)    ------------- (ImpR)
//!    A → B, Γ ⊢ Δ                Γ ⊢ A → B, Δ
//!
//!  A[t/x], Γ ⊢ Δ              Γ ⊢ A[y/x], Δ
//! --------------- (ForallL t)  -------------- (ForallR y, y fresh)
//!  ∀x.A, Γ ⊢ Δ                 Γ ⊢ ∀x.A, Δ
//! ```
//!
//! together with `BottomL`, `TopR`, their existential duals, and the
//! structural rules `WL`/`WR`, `CL`/`CR`, `PL i`/`PR i`.

use std::fmt::Display;

use thiserror::Error;

use crate::tt::{mk_var, Formula, FormulaQuant, Judgement, Name, Term};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    I,
    Cut(Formula),
    AndL1,
    AndL2,
    AndR,
    OrL,
    OrR1,
    OrR2,
    ImpL,
    ImpR,
    BottomL,
    TopR,
    ForallL(Term),
    ForallR(Name),
    ExistL(Name),
    ExistR(Term),
    WL,
    WR,
    CL,
    CR,
    PL(usize),
    PR(usize),
}

impl Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::I => write!(f, "I"),
            Rule::Cut(a) => write!(f, "Cut {a}"),
            Rule::AndL1 => write!(f, "AndL1"),
            Rule::AndL2 => write!(f, "AndL2"),
            Rule::AndR => write!(f, "AndR"),
            Rule::OrL => write!(f, "OrL"),
            Rule::OrR1 => write!(f, "OrR1"),
            Rule::OrR2 => write!(f, "OrR2"),
            Rule::ImpL => write!(f, "ImpL"),
            Rule::ImpR => write!(f, "ImpR"),
            Rule::BottomL => write!(f, "BottomL"),
            Rule::TopR => write!(f, "TopR"),
            Rule::ForallL(t) => write!(f, "ForallL {t}"),
            Rule::ForallR(y) => write!(f, "ForallR {y}"),
            Rule::ExistL(y) => write!(f, "ExistL {y}"),
            Rule::ExistR(t) => write!(f, "ExistR {t}"),
            Rule::WL => write!(f, "WL"),
            Rule::WR => write!(f, "WR"),
            Rule::CL => write!(f, "CL"),
            Rule::CR => write!(f, "CR"),
            Rule::PL(i) => write!(f, "PL {i}"),
            Rule::PR(i) => write!(f, "PR {i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {rule}: {message}")]
pub struct RuleError {
    pub rule: Rule,
    pub message: String,
}

/// Failure inside [`judge_many`], with the goals reached before the failing
/// rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step {index} ({rule}) failed: {message}")]
pub struct JudgeManyError {
    pub index: usize,
    pub rule: Rule,
    pub message: String,
    pub goals: Vec<Judgement>,
}

enum Side {
    Left,
    Right,
}

struct Step<'a> {
    rule: &'a Rule,
    goal: &'a Judgement,
    rest: &'a [Judgement],
}

impl<'a> Step<'a> {
    fn fail<R>(&self, message: impl Into<String>) -> Result<R, RuleError> {
        Err(RuleError {
            rule: self.rule.clone(),
            message: message.into(),
        })
    }

    fn head(&self, side: Side) -> Result<(&'a Formula, &'a [Formula]), RuleError> {
        let (formulas, what) = match side {
            Side::Left => (&self.goal.assms, "assumption"),
            Side::Right => (&self.goal.concls, "conclusion"),
        };
        match formulas.split_first() {
            Some(split) => Ok(split),
            None => self.fail(format!("no {what} to act on")),
        }
    }

    fn quant(&self, side: Side, exist: bool) -> Result<(&'a FormulaQuant, &'a [Formula]), RuleError> {
        let (head, rest) = self.head(side)?;
        match (head, exist) {
            (Formula::Forall(inner), false) => Ok((&**inner, rest)),
            (Formula::Exist(inner), true) => Ok((&**inner, rest)),
            (_, false) => self.fail(format!("{head} is not a universal formula")),
            (_, true) => self.fail(format!("{head} is not an existential formula")),
        }
    }

    /// Eigenvariable condition: `y` must not occur free in the principal
    /// formula, in the side formulas, or in any other open goal.
    fn check_fresh(&self, y: &Name, principal: &Formula) -> Result<(), RuleError> {
        if principal.has_free(y) {
            return self.fail(format!("{y} occurs free in {principal}"));
        }
        let mut side_formulas = self.goal.assms.iter().chain(self.goal.concls.iter());
        if let Some(f) = side_formulas.find(|f| !std::ptr::eq(*f, principal) && f.has_free(y)) {
            return self.fail(format!("{y} occurs free in {f}"));
        }
        if let Some(j) = self.rest.iter().find(|j| j.free_vars().contains(y)) {
            return self.fail(format!("{y} occurs free in the open goal {j}"));
        }
        Ok(())
    }

    fn binary<'f>(&self, head: &'f Formula) -> Option<(&'f Formula, &'f Formula)> {
        match (self.rule, head) {
            (Rule::AndL1 | Rule::AndL2 | Rule::AndR, Formula::And(inner))
            | (Rule::OrL | Rule::OrR1 | Rule::OrR2, Formula::Or(inner))
            | (Rule::ImpL | Rule::ImpR, Formula::Imply(inner)) => Some((&inner.lhs, &inner.rhs)),
            _ => None,
        }
    }

    fn connective(&self, side: Side) -> Result<(&'a Formula, &'a Formula, &'a [Formula]), RuleError> {
        let (head, rest) = self.head(side)?;
        match self.binary(head) {
            Some((a, b)) => Ok((a, b, rest)),
            None => {
                let expected = match self.rule {
                    Rule::AndL1 | Rule::AndL2 | Rule::AndR => "a conjunction",
                    Rule::OrL | Rule::OrR1 | Rule::OrR2 => "a disjunction",
                    _ => "an implication",
                };
                self.fail(format!("{head} is not {expected}"))
            }
        }
    }

    fn premises(&self) -> Result<Vec<Judgement>, RuleError> {
        let assms = &self.goal.assms;
        let concls = &self.goal.concls;
        let cons = |a: &Formula, rest: &[Formula]| {
            let mut v = Vec::with_capacity(rest.len() + 1);
            v.push(a.clone());
            v.extend_from_slice(rest);
            v
        };
        let premises = match self.rule {
            Rule::I => {
                if self.goal.is_closed_by_assumption() {
                    vec![]
                } else if assms.len() != 1 || concls.len() != 1 {
                    return self.fail(format!(
                        "expected exactly one assumption and one conclusion, found {} and {}",
                        assms.len(),
                        concls.len()
                    ));
                } else {
                    return self.fail(format!("{} and {} differ", assms[0], concls[0]));
                }
            }
            Rule::Cut(a) => vec![
                Judgement::new(assms.clone(), cons(a, concls)),
                Judgement::new(cons(a, assms), concls.clone()),
            ],
            Rule::AndL1 | Rule::AndL2 => {
                let (a, b, gamma) = self.connective(Side::Left)?;
                let picked = if let Rule::AndL1 = self.rule { a } else { b };
                vec![Judgement::new(cons(picked, gamma), concls.clone())]
            }
            Rule::AndR => {
                let (a, b, delta) = self.connective(Side::Right)?;
                vec![
                    Judgement::new(assms.clone(), cons(a, delta)),
                    Judgement::new(assms.clone(), cons(b, delta)),
                ]
            }
            Rule::OrL => {
                let (a, b, gamma) = self.connective(Side::Left)?;
                vec![
                    Judgement::new(cons(a, gamma), concls.clone()),
                    Judgement::new(cons(b, gamma), concls.clone()),
                ]
            }
            Rule::OrR1 | Rule::OrR2 => {
                let (a, b, delta) = self.connective(Side::Right)?;
                let picked = if let Rule::OrR1 = self.rule { a } else { b };
                vec![Judgement::new(assms.clone(), cons(picked, delta))]
            }
            Rule::ImpL => {
                let (a, b, gamma) = self.connective(Side::Left)?;
                vec![
                    Judgement::new(gamma.to_vec(), cons(a, concls)),
                    Judgement::new(cons(b, gamma), concls.clone()),
                ]
            }
            Rule::ImpR => {
                let (a, b, delta) = self.connective(Side::Right)?;
                vec![Judgement::new(cons(a, assms), cons(b, delta))]
            }
            Rule::BottomL => {
                let (head, _) = self.head(Side::Left)?;
                if *head != Formula::Bottom {
                    return self.fail(format!("{head} is not ⊥"));
                }
                vec![]
            }
            Rule::TopR => {
                let (head, _) = self.head(Side::Right)?;
                if *head != Formula::Top {
                    return self.fail(format!("{head} is not ⊤"));
                }
                vec![]
            }
            Rule::ForallL(t) => {
                let (q, gamma) = self.quant(Side::Left, false)?;
                let a = q.body.subst(&q.binder, t);
                vec![Judgement::new(cons(&a, gamma), concls.clone())]
            }
            Rule::ExistR(t) => {
                let (q, delta) = self.quant(Side::Right, true)?;
                let a = q.body.subst(&q.binder, t);
                vec![Judgement::new(assms.clone(), cons(&a, delta))]
            }
            Rule::ForallR(y) => {
                let (q, delta) = self.quant(Side::Right, false)?;
                self.check_fresh(y, &concls[0])?;
                let a = q.body.subst(&q.binder, &mk_var(y.clone()));
                vec![Judgement::new(assms.clone(), cons(&a, delta))]
            }
            Rule::ExistL(y) => {
                let (q, gamma) = self.quant(Side::Left, true)?;
                self.check_fresh(y, &assms[0])?;
                let a = q.body.subst(&q.binder, &mk_var(y.clone()));
                vec![Judgement::new(cons(&a, gamma), concls.clone())]
            }
            Rule::WL => {
                let (_, gamma) = self.head(Side::Left)?;
                vec![Judgement::new(gamma.to_vec(), concls.clone())]
            }
            Rule::WR => {
                let (_, delta) = self.head(Side::Right)?;
                vec![Judgement::new(assms.clone(), delta.to_vec())]
            }
            Rule::CL => {
                let (a, _) = self.head(Side::Left)?;
                vec![Judgement::new(cons(a, assms), concls.clone())]
            }
            Rule::CR => {
                let (a, _) = self.head(Side::Right)?;
                vec![Judgement::new(assms.clone(), cons(a, concls))]
            }
            Rule::PL(i) => {
                let Some(assms) = move_to_front(assms, *i) else {
                    return self.fail(format!(
                        "index {i} out of range for {} assumption(s)",
                        assms.len()
                    ));
                };
                vec![Judgement::new(assms, concls.clone())]
            }
            Rule::PR(i) => {
                let Some(concls) = move_to_front(concls, *i) else {
                    return self.fail(format!(
                        "index {i} out of range for {} conclusion(s)",
                        concls.len()
                    ));
                };
                vec![Judgement::new(assms.clone(), concls)]
            }
        };
        Ok(premises)
    }
}

fn move_to_front(formulas: &[Formula], index: usize) -> Option<Vec<Formula>> {
    if index >= formulas.len() {
        return None;
    }
    let mut out = Vec::with_capacity(formulas.len());
    out.push(formulas[index].clone());
    out.extend(
        formulas
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != index)
            .map(|(_, f)| f.clone()),
    );
    Some(out)
}

/// Applies `rule` to the first goal and prepends its premises to the
/// remaining goals. `goals` is never modified.
pub fn judge_one(rule: &Rule, goals: &[Judgement]) -> Result<Vec<Judgement>, RuleError> {
    let Some((goal, rest)) = goals.split_first() else {
        return Err(RuleError {
            rule: rule.clone(),
            message: "no goals".to_owned(),
        });
    };
    let step = Step { rule, goal, rest };
    let mut next = step.premises()?;
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("{rule}: {goal} ↝ {} new goal(s)", next.len());
    }
    next.extend_from_slice(rest);
    Ok(next)
}

pub fn judge_many(rules: &[Rule], goals: &[Judgement]) -> Result<Vec<Judgement>, JudgeManyError> {
    let mut current = goals.to_vec();
    for (index, rule) in rules.iter().enumerate() {
        match judge_one(rule, &current) {
            Ok(next) => current = next,
            Err(RuleError { rule, message }) => {
                return Err(JudgeManyError {
                    index,
                    rule,
                    message,
                    goals: current,
                });
            }
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse_formula, parse_judgement, parse_rule};
    use crate::tt::mk_var;

    fn judgement(text: &str) -> Judgement {
        parse_judgement(text).unwrap_or_else(|err| panic!("{text}: {err}"))
    }

    fn rules(texts: &[&str]) -> Vec<Rule> {
        texts
            .iter()
            .map(|text| parse_rule(text).unwrap_or_else(|err| panic!("{text}: {err}")))
            .collect()
    }

    fn one(rule: &str, goal: &str) -> Result<Vec<Judgement>, RuleError> {
        let rule = parse_rule(rule).expect("rule parses");
        judge_one(&rule, &[judgement(goal)])
    }

    fn goals(texts: &[&str]) -> Vec<Judgement> {
        texts.iter().map(|text| judgement(text)).collect()
    }

    #[test]
    fn identity_requires_exact_match() {
        assert_eq!(one("I", "A ⊢ A"), Ok(vec![]));
        assert!(one("I", "A ⊢ B").is_err());
        assert!(one("I", "A, A ⊢ A").is_err());
        assert!(one("I", "A ⊢ A, A").is_err());
        assert!(one("I", "⊢ A").is_err());
        // structural equality, not alpha-equivalence
        assert!(one("I", "∀x. P(x) ⊢ ∀y. P(y)").is_err());
        assert_eq!(one("I", "A ⊢ B").unwrap_err().message, "A and B differ");
        assert_eq!(
            one("I", "A, A ⊢ A").unwrap_err().message,
            "expected exactly one assumption and one conclusion, found 2 and 1"
        );
        assert!(judgement("P(x) ⊢ P(x)").is_closed_by_assumption());
        assert!(!judgement("P(x) ⊢ P(y)").is_closed_by_assumption());
    }

    #[test]
    fn cut_opens_two_goals() {
        assert_eq!(
            one("Cut C", "A ⊢ B"),
            Ok(goals(&["A ⊢ C, B", "C, A ⊢ B"]))
        );
    }

    #[test]
    fn propositional_rules() {
        assert_eq!(one("AndL1", "A ∧ B, C ⊢ D"), Ok(goals(&["A, C ⊢ D"])));
        assert_eq!(one("AndL2", "A ∧ B, C ⊢ D"), Ok(goals(&["B, C ⊢ D"])));
        assert_eq!(
            one("AndR", "C ⊢ A ∧ B, D"),
            Ok(goals(&["C ⊢ A, D", "C ⊢ B, D"]))
        );
        assert_eq!(one("OrL", "A ∨ B ⊢ C"), Ok(goals(&["A ⊢ C", "B ⊢ C"])));
        assert_eq!(one("OrR1", "⊢ A ∨ B, C"), Ok(goals(&["⊢ A, C"])));
        assert_eq!(one("OrR2", "⊢ A ∨ B, C"), Ok(goals(&["⊢ B, C"])));
        assert_eq!(
            one("ImpL", "A → B, C ⊢ D"),
            Ok(goals(&["C ⊢ A, D", "B, C ⊢ D"]))
        );
        assert_eq!(one("ImpR", "C ⊢ A → B, D"), Ok(goals(&["A, C ⊢ B, D"])));
        assert_eq!(one("BottomL", "⊥, A ⊢ B"), Ok(vec![]));
        assert_eq!(one("TopR", "A ⊢ ⊤, B"), Ok(vec![]));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = one("AndL1", "A ∨ B ⊢ C").unwrap_err();
        assert_eq!(err.message, "A ∨ B is not a conjunction");
        assert!(one("ImpR", "A → B ⊢ C").is_err());
        assert!(one("BottomL", "⊤ ⊢").is_err());
        assert!(one("ForallL x", "∃x. P(x) ⊢").is_err());
    }

    #[test]
    fn structural_rules() {
        assert_eq!(one("WL", "A, B ⊢ C"), Ok(goals(&["B ⊢ C"])));
        assert_eq!(one("WR", "A ⊢ B, C"), Ok(goals(&["A ⊢ C"])));
        assert_eq!(one("CL", "A, B ⊢ C"), Ok(goals(&["A, A, B ⊢ C"])));
        assert_eq!(one("CR", "A ⊢ B, C"), Ok(goals(&["A ⊢ B, B, C"])));
        assert_eq!(one("PL 2", "A, B, C ⊢"), Ok(goals(&["C, A, B ⊢"])));
        assert_eq!(one("PR 1", "⊢ A, B, C"), Ok(goals(&["⊢ B, A, C"])));
        let err = one("PL 3", "A, B, C ⊢").unwrap_err();
        assert_eq!(err.message, "index 3 out of range for 3 assumption(s)");
        assert!(one("WR", "A ⊢").is_err());
    }

    #[test]
    fn quantifier_rules() {
        assert_eq!(
            one("ForallL f(c)", "∀x. P(x, y) ⊢ Q"),
            Ok(goals(&["P(f(c), y) ⊢ Q"]))
        );
        assert_eq!(
            one("ExistR c", "⊢ ∃x. P(x), Q"),
            Ok(goals(&["⊢ P(c), Q"]))
        );
        assert_eq!(one("ForallR z", "A ⊢ ∀x. P(x)"), Ok(goals(&["A ⊢ P(z)"])));
        assert_eq!(one("ExistL z", "∃x. P(x) ⊢ A"), Ok(goals(&["P(z) ⊢ A"])));
    }

    #[test]
    fn eigenvariable_condition() {
        // free in the quantified body
        assert!(one("ForallR y", "⊢ ∀x. P(x, y)").is_err());
        // free in another formula of the same goal
        assert!(one("ForallR y", "Q(y) ⊢ ∀x. P(x)").is_err());
        assert!(one("ExistL y", "∃x. P(x) ⊢ Q(y)").is_err());
        // free in another open goal
        let stack = goals(&["⊢ ∀x. P(x)", "⊢ Q(y)"]);
        let err = judge_one(&Rule::ForallR(Name::from_str("y")), &stack).unwrap_err();
        assert!(err.message.contains("open goal"), "{}", err.message);
        let stack = goals(&["∃x. P(x) ⊢", "⊢ Q(y)"]);
        let err = judge_one(&Rule::ExistL(Name::from_str("y")), &stack).unwrap_err();
        assert_eq!(err.message, "y occurs free in the open goal ⊢ Q(y)");
        // the bound variable itself may be reused
        assert!(one("ForallR x", "⊢ ∀x. P(x)").is_ok());
    }

    #[test]
    fn freshness_example_closes_all_goals() {
        let start = goals(&["∀x. (P(x) ∨ Q()) ⊢ (∀x. P(x)) ∨ Q()"]);
        let script = rules(&[
            "CR", "OrR2", "PR 1", "OrR1", "ForallR y", "ForallL y", "OrL", "PR 1", "WR", "I",
            "WR", "I",
        ]);
        assert_eq!(judge_many(&script, &start), Ok(vec![]));
    }

    #[test]
    fn judge_many_reports_progress() {
        let start = goals(&["A ∧ B ⊢ B"]);
        let script = rules(&["AndL1", "I"]);
        let err = judge_many(&script, &start).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.rule, Rule::I);
        assert_eq!(err.goals, goals(&["A ⊢ B"]));
    }

    #[test]
    fn failure_leaves_goals_untouched() {
        let stack = goals(&["A ⊢ B", "C ⊢ C"]);
        let before = stack.clone();
        assert!(judge_one(&Rule::I, &stack).is_err());
        assert_eq!(stack, before);
        assert!(judge_one(&Rule::I, &[]).is_err());
    }

    #[test]
    fn focus_moves_to_next_goal() {
        let stack = goals(&["A ⊢ A", "B ⊢ B"]);
        let next = judge_one(&Rule::I, &stack).expect("closes first goal");
        assert_eq!(next, goals(&["B ⊢ B"]));
    }

    #[test]
    fn rule_display_round_trips() {
        let all = [
            Rule::I,
            Rule::Cut(parse_formula("A → B").expect("parse")),
            Rule::ForallL(mk_var(Name::from_str("t"))),
            Rule::ExistL(Name::from_str("y")),
            Rule::PR(3),
        ];
        for rule in all {
            assert_eq!(parse_rule(&rule.to_string()), Ok(rule));
        }
    }
}
