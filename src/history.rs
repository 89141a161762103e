use crate::env::Env;
use crate::proof::{judge_one, Rule, RuleError};
use crate::tt::{Formula, Judgement, Name};

/// Goal stacks of one proof, oldest first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofHistory {
    frames: Vec<Vec<Judgement>>,
}

impl ProofHistory {
    pub fn new(goal: Judgement) -> Self {
        ProofHistory {
            frames: vec![vec![goal]],
        }
    }

    pub fn top(&self) -> &[Judgement] {
        match self.frames.last() {
            Some(goals) => goals,
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Vec<Judgement>] {
        &self.frames
    }

    pub fn push(&mut self, goals: Vec<Judgement>) {
        self.frames.push(goals);
    }

    /// Drops the newest frame. The initial frame is never dropped.
    pub fn pop(&mut self) -> Option<Vec<Judgement>> {
        if self.frames.len() <= 1 {
            return None;
        }
        self.frames.pop()
    }

    /// Applies `rule` to the current goals and pushes the result. The
    /// history is unchanged on failure.
    pub fn apply_rule(&mut self, rule: &Rule) -> Result<&[Judgement], RuleError> {
        let goals = judge_one(rule, self.top())?;
        self.push(goals);
        Ok(self.top())
    }

    pub fn is_finished(&self) -> bool {
        self.top().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopFrame {
    Theorem {
        name: Name,
        formula: Formula,
        proof: ProofHistory,
        env: Env,
    },
    Other {
        env: Env,
    },
}

impl TopFrame {
    /// The environment as it was before the command that pushed this frame.
    pub fn env(&self) -> &Env {
        match self {
            TopFrame::Theorem { env, .. } | TopFrame::Other { env } => env,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopHistory {
    frames: Vec<TopFrame>,
}

impl TopHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: TopFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<TopFrame> {
        self.frames.pop()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse_formula, parse_rule};

    fn history(goal: &str) -> ProofHistory {
        ProofHistory::new(Judgement::goal(parse_formula(goal).unwrap()))
    }

    #[test]
    fn initial_frame_is_kept() {
        let mut h = history("A → A");
        assert_eq!(h.len(), 1);
        assert_eq!(h.pop(), None);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn apply_then_pop_restores() {
        let mut h = history("A → A");
        let before = h.clone();
        h.apply_rule(&parse_rule("ImpR").unwrap()).unwrap();
        h.apply_rule(&parse_rule("I").unwrap()).unwrap();
        assert!(h.is_finished());
        assert_eq!(h.len(), 3);
        h.pop();
        h.pop();
        assert_eq!(h, before);
    }

    #[test]
    fn failed_rule_leaves_history_alone() {
        let mut h = history("A → A");
        let before = h.clone();
        assert!(h.apply_rule(&parse_rule("AndR").unwrap()).is_err());
        assert_eq!(h, before);
    }

    #[test]
    fn top_frames_carry_environments() {
        let env = Env::new();
        let mut top = TopHistory::new();
        top.push(TopFrame::Other { env: env.clone() });
        top.push(TopFrame::Theorem {
            name: Name::from_str("id"),
            formula: parse_formula("A → A").unwrap(),
            proof: history("A → A"),
            env: env.clone(),
        });
        assert_eq!(top.len(), 2);
        assert!(matches!(top.pop(), Some(TopFrame::Theorem { .. })));
        assert_eq!(top.pop().map(|frame| frame.env().clone()), Some(env));
        assert_eq!(top.pop(), None);
    }
}
