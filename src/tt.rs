use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::iter::zip;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Name(Arc<str>);

impl Name {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(value: &str) -> Name {
        Name(Arc::from(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends `'` until the name no longer occurs in `avoid`.
    pub fn freshen(&self, avoid: &HashSet<Name>) -> Name {
        let mut candidate = self.0.to_string();
        while avoid.contains(candidate.as_str()) {
            candidate.push('\'');
        }
        Name::from_str(&candidate)
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::from_str(value)
    }
}

/// Index of a unification cell inside an [`crate::elab::Context`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct Id(usize);

impl Id {
    pub(crate) fn new(index: usize) -> Self {
        Id(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Var(Name),
    Abs(Arc<TermAbs>),
    App(Arc<TermApp>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermAbs {
    pub binders: Vec<Name>,
    pub body: Term,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermApp {
    pub fun: Term,
    pub args: Vec<Term>,
}

#[inline]
pub fn mk_var(name: Name) -> Term {
    Term::Var(name)
}

#[inline]
pub fn mk_abs(binders: Vec<Name>, body: Term) -> Term {
    Term::Abs(Arc::new(TermAbs { binders, body }))
}

#[inline]
pub fn mk_app(fun: Term, args: Vec<Term>) -> Term {
    Term::App(Arc::new(TermApp { fun, args }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Declared type variable, written `'a`. Rigid until instantiated.
    Var(Name),
    Hole(Id),
    Con(Arc<TypeCon>),
    Arrow(Arc<TypeArrow>),
    Prop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCon {
    pub name: Name,
    pub args: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeArrow {
    pub dom: Type,
    pub cod: Type,
}

#[inline]
pub fn mk_type_var(name: Name) -> Type {
    Type::Var(name)
}

#[inline]
pub fn mk_type_hole(id: Id) -> Type {
    Type::Hole(id)
}

#[inline]
pub fn mk_type_con(name: Name, args: Vec<Type>) -> Type {
    Type::Con(Arc::new(TypeCon { name, args }))
}

#[inline]
pub fn mk_type_arrow(dom: Type, cod: Type) -> Type {
    Type::Arrow(Arc::new(TypeArrow { dom, cod }))
}

#[inline]
pub fn mk_type_prop() -> Type {
    Type::Prop
}

impl Type {
    /// `t₁ → ⋯ → tₙ → self`
    pub fn arrow(self, doms: impl IntoIterator<Item = Type>) -> Type {
        let doms = doms.into_iter().collect::<Vec<_>>();
        doms.into_iter()
            .rev()
            .fold(self, |cod, dom| mk_type_arrow(dom, cod))
    }

    /// Splits `t₁ → ⋯ → tₙ → u` into `([t₁, ⋯, tₙ], u)`.
    pub fn unarrow(&self) -> (Vec<Type>, Type) {
        let mut doms = vec![];
        let mut current = self;
        while let Type::Arrow(inner) = current {
            doms.push(inner.dom.clone());
            current = &inner.cod;
        }
        (doms, current.clone())
    }

    pub fn type_vars(&self, acc: &mut Vec<Name>) {
        match self {
            Type::Var(name) => {
                if !acc.contains(name) {
                    acc.push(name.clone());
                }
            }
            Type::Hole(_) | Type::Prop => {}
            Type::Con(inner) => {
                for arg in &inner.args {
                    arg.type_vars(acc);
                }
            }
            Type::Arrow(inner) => {
                inner.dom.type_vars(acc);
                inner.cod.type_vars(acc);
            }
        }
    }

    pub fn subst_vars(&self, subst: &HashMap<Name, Type>) -> Type {
        match self {
            Type::Var(name) => subst.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Hole(_) | Type::Prop => self.clone(),
            Type::Con(inner) => mk_type_con(
                inner.name.clone(),
                inner.args.iter().map(|arg| arg.subst_vars(subst)).collect(),
            ),
            Type::Arrow(inner) => mk_type_arrow(
                inner.dom.subst_vars(subst),
                inner.cod.subst_vars(subst),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Pred(Arc<FormulaPred>),
    Top,
    Bottom,
    And(Arc<FormulaBinary>),
    Or(Arc<FormulaBinary>),
    Imply(Arc<FormulaBinary>),
    Forall(Arc<FormulaQuant>),
    Exist(Arc<FormulaQuant>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaPred {
    pub name: Name,
    pub args: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaBinary {
    pub lhs: Formula,
    pub rhs: Formula,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaQuant {
    pub binder: Name,
    pub body: Formula,
}

#[inline]
pub fn mk_pred(name: Name, args: Vec<Term>) -> Formula {
    Formula::Pred(Arc::new(FormulaPred { name, args }))
}

#[inline]
pub fn mk_and(lhs: Formula, rhs: Formula) -> Formula {
    Formula::And(Arc::new(FormulaBinary { lhs, rhs }))
}

#[inline]
pub fn mk_or(lhs: Formula, rhs: Formula) -> Formula {
    Formula::Or(Arc::new(FormulaBinary { lhs, rhs }))
}

#[inline]
pub fn mk_imply(lhs: Formula, rhs: Formula) -> Formula {
    Formula::Imply(Arc::new(FormulaBinary { lhs, rhs }))
}

#[inline]
pub fn mk_forall(binder: Name, body: Formula) -> Formula {
    Formula::Forall(Arc::new(FormulaQuant { binder, body }))
}

#[inline]
pub fn mk_exist(binder: Name, body: Formula) -> Formula {
    Formula::Exist(Arc::new(FormulaQuant { binder, body }))
}

/// Binder renaming shared by terms and formulas: every binder that would
/// capture a free variable of the replacement is freshened.
fn rename_binders(
    binders: &[Name],
    body_fv: HashSet<Name>,
    subst: &HashMap<Name, Term>,
) -> (Vec<Name>, HashMap<Name, Term>) {
    let repl_fv = subst
        .values()
        .flat_map(Term::free_vars)
        .collect::<HashSet<_>>();
    let mut avoid = body_fv;
    avoid.extend(repl_fv.iter().cloned());
    avoid.extend(subst.keys().cloned());
    avoid.extend(binders.iter().cloned());
    let mut renaming = HashMap::new();
    let mut new_binders = Vec::with_capacity(binders.len());
    for binder in binders {
        if repl_fv.contains(binder) {
            let fresh = binder.freshen(&avoid);
            avoid.insert(fresh.clone());
            renaming.insert(binder.clone(), mk_var(fresh.clone()));
            new_binders.push(fresh);
        } else {
            new_binders.push(binder.clone());
        }
    }
    (new_binders, renaming)
}

impl Term {
    pub fn free_vars(&self) -> HashSet<Name> {
        let mut acc = HashSet::new();
        self.free_vars_help(&mut vec![], &mut acc);
        acc
    }

    fn free_vars_help(&self, bound: &mut Vec<Name>, acc: &mut HashSet<Name>) {
        match self {
            Term::Var(name) => {
                if !bound.contains(name) {
                    acc.insert(name.clone());
                }
            }
            Term::Abs(inner) => {
                let len = bound.len();
                bound.extend(inner.binders.iter().cloned());
                inner.body.free_vars_help(bound, acc);
                bound.truncate(len);
            }
            Term::App(inner) => {
                inner.fun.free_vars_help(bound, acc);
                for arg in &inner.args {
                    arg.free_vars_help(bound, acc);
                }
            }
        }
    }

    /// [s/x]self
    pub fn subst(&self, x: &Name, s: &Term) -> Term {
        self.subst_all(&HashMap::from([(x.clone(), s.clone())]))
    }

    /// Simultaneous capture-avoiding substitution.
    pub fn subst_all(&self, subst: &HashMap<Name, Term>) -> Term {
        if subst.is_empty() {
            return self.clone();
        }
        match self {
            Term::Var(name) => subst.get(name).cloned().unwrap_or_else(|| self.clone()),
            Term::App(inner) => mk_app(
                inner.fun.subst_all(subst),
                inner.args.iter().map(|arg| arg.subst_all(subst)).collect(),
            ),
            Term::Abs(inner) => {
                let mut subst = subst.clone();
                for binder in &inner.binders {
                    subst.remove(binder);
                }
                if subst.is_empty() {
                    return self.clone();
                }
                let (binders, renaming) =
                    rename_binders(&inner.binders, inner.body.free_vars(), &subst);
                let body = inner.body.subst_all(&renaming);
                mk_abs(binders, body.subst_all(&subst))
            }
        }
    }
}

impl Formula {
    /// Free term variables. Predicate names are not included.
    pub fn free_vars(&self) -> HashSet<Name> {
        let mut acc = HashSet::new();
        self.free_help(false, &mut vec![], &mut acc);
        acc
    }

    /// Free term variables together with free predicate names.
    pub fn free_idents(&self) -> HashSet<Name> {
        let mut acc = HashSet::new();
        self.free_help(true, &mut vec![], &mut acc);
        acc
    }

    fn free_help(&self, with_preds: bool, bound: &mut Vec<Name>, acc: &mut HashSet<Name>) {
        match self {
            Formula::Pred(inner) => {
                if with_preds && !bound.contains(&inner.name) {
                    acc.insert(inner.name.clone());
                }
                for arg in &inner.args {
                    arg.free_vars_help(bound, acc);
                }
            }
            Formula::Top | Formula::Bottom => {}
            Formula::And(inner) | Formula::Or(inner) | Formula::Imply(inner) => {
                inner.lhs.free_help(with_preds, bound, acc);
                inner.rhs.free_help(with_preds, bound, acc);
            }
            Formula::Forall(inner) | Formula::Exist(inner) => {
                bound.push(inner.binder.clone());
                inner.body.free_help(with_preds, bound, acc);
                bound.pop();
            }
        }
    }

    pub fn has_free(&self, x: &Name) -> bool {
        self.free_vars().contains(x)
    }

    fn map_binary(&self, f: impl Fn(&Formula) -> Formula) -> Formula {
        match self {
            Formula::And(inner) => mk_and(f(&inner.lhs), f(&inner.rhs)),
            Formula::Or(inner) => mk_or(f(&inner.lhs), f(&inner.rhs)),
            Formula::Imply(inner) => mk_imply(f(&inner.lhs), f(&inner.rhs)),
            _ => self.clone(),
        }
    }

    fn rebuild_quant(&self, binder: Name, body: Formula) -> Formula {
        match self {
            Formula::Exist(_) => mk_exist(binder, body),
            _ => mk_forall(binder, body),
        }
    }

    /// [t/x]self
    pub fn subst(&self, x: &Name, t: &Term) -> Formula {
        self.subst_all(&HashMap::from([(x.clone(), t.clone())]))
    }

    /// Simultaneous capture-avoiding substitution of term variables.
    pub fn subst_all(&self, subst: &HashMap<Name, Term>) -> Formula {
        if subst.is_empty() {
            return self.clone();
        }
        match self {
            Formula::Pred(inner) => mk_pred(
                inner.name.clone(),
                inner.args.iter().map(|arg| arg.subst_all(subst)).collect(),
            ),
            Formula::Top | Formula::Bottom => self.clone(),
            Formula::And(_) | Formula::Or(_) | Formula::Imply(_) => {
                self.map_binary(|f| f.subst_all(subst))
            }
            Formula::Forall(inner) | Formula::Exist(inner) => {
                let mut subst = subst.clone();
                subst.remove(&inner.binder);
                if subst.is_empty() {
                    return self.clone();
                }
                let (binders, renaming) = rename_binders(
                    std::slice::from_ref(&inner.binder),
                    inner.body.free_vars(),
                    &subst,
                );
                let body = inner.body.subst_all(&renaming);
                let binder = binders.into_iter().next().unwrap_or_else(|| inner.binder.clone());
                self.rebuild_quant(binder, body.subst_all(&subst))
            }
        }
    }

    /// Replaces every occurrence of a predicate named in `preds` by its
    /// instantiation. Errors raised by an instantiation are propagated.
    pub fn subst_preds(&self, preds: &HashMap<Name, Predicate>) -> Result<Formula, String> {
        let captured = preds
            .values()
            .flat_map(Predicate::free_vars)
            .collect::<HashSet<_>>();
        self.subst_preds_help(preds, &captured)
    }

    fn subst_preds_help(
        &self,
        preds: &HashMap<Name, Predicate>,
        captured: &HashSet<Name>,
    ) -> Result<Formula, String> {
        match self {
            Formula::Pred(inner) => match preds.get(&inner.name) {
                Some(pred) => pred.apply(&inner.args),
                None => Ok(self.clone()),
            },
            Formula::Top | Formula::Bottom => Ok(self.clone()),
            Formula::And(inner) => Ok(mk_and(
                inner.lhs.subst_preds_help(preds, captured)?,
                inner.rhs.subst_preds_help(preds, captured)?,
            )),
            Formula::Or(inner) => Ok(mk_or(
                inner.lhs.subst_preds_help(preds, captured)?,
                inner.rhs.subst_preds_help(preds, captured)?,
            )),
            Formula::Imply(inner) => Ok(mk_imply(
                inner.lhs.subst_preds_help(preds, captured)?,
                inner.rhs.subst_preds_help(preds, captured)?,
            )),
            Formula::Forall(inner) | Formula::Exist(inner) => {
                let (binder, body) = if captured.contains(&inner.binder) {
                    let mut avoid = inner.body.free_vars();
                    avoid.extend(captured.iter().cloned());
                    avoid.insert(inner.binder.clone());
                    let fresh = inner.binder.freshen(&avoid);
                    let body = inner.body.subst(&inner.binder, &mk_var(fresh.clone()));
                    (fresh, body)
                } else {
                    (inner.binder.clone(), inner.body.clone())
                };
                let body = body.subst_preds_help(preds, captured)?;
                Ok(self.rebuild_quant(binder, body))
            }
        }
    }
}

/// A predicate instantiation `λ params. body` as supplied to `use`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub params: Vec<Name>,
    pub body: Formula,
}

impl Predicate {
    pub fn new(params: Vec<Name>, body: Formula) -> Self {
        Self { params, body }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn apply(&self, args: &[Term]) -> Result<Formula, String> {
        if args.len() != self.arity() {
            return Err(format!(
                "predicate expects {} argument(s) but {} were given",
                self.arity(),
                args.len()
            ));
        }
        let subst = zip(self.params.iter().cloned(), args.iter().cloned()).collect();
        Ok(self.body.subst_all(&subst))
    }

    pub fn free_vars(&self) -> HashSet<Name> {
        let mut fv = self.body.free_vars();
        for param in &self.params {
            fv.remove(param);
        }
        fv
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Judgement {
    pub assms: Vec<Formula>,
    pub concls: Vec<Formula>,
}

impl Judgement {
    pub fn new(assms: Vec<Formula>, concls: Vec<Formula>) -> Self {
        Self { assms, concls }
    }

    /// `⊢ target`
    pub fn goal(target: Formula) -> Self {
        Self {
            assms: vec![],
            concls: vec![target],
        }
    }

    /// `A ⊢ A`, with both sides structurally equal.
    pub fn is_closed_by_assumption(&self) -> bool {
        self.assms.len() == 1 && self.concls.len() == 1 && self.assms[0] == self.concls[0]
    }

    pub fn free_vars(&self) -> HashSet<Name> {
        self.assms
            .iter()
            .chain(self.concls.iter())
            .flat_map(Formula::free_vars)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        Name::from_str(s)
    }

    fn v(s: &str) -> Term {
        mk_var(n(s))
    }

    fn p(name: &str, args: Vec<Term>) -> Formula {
        mk_pred(n(name), args)
    }

    #[test]
    fn freshen_appends_primes() {
        let avoid = HashSet::from([n("x"), n("x'")]);
        assert_eq!(n("x").freshen(&avoid), n("x''"));
        assert_eq!(n("y").freshen(&avoid), n("y"));
    }

    #[test]
    fn free_vars_respect_binders() {
        let m = mk_abs(vec![n("x")], mk_app(v("f"), vec![v("x"), v("y")]));
        let fv = m.free_vars();
        assert_eq!(fv, HashSet::from([n("f"), n("y")]));
    }

    #[test]
    fn formula_free_vars_exclude_predicates() {
        let f = mk_forall(n("x"), p("P", vec![v("x"), v("z")]));
        assert_eq!(f.free_vars(), HashSet::from([n("z")]));
        assert_eq!(f.free_idents(), HashSet::from([n("P"), n("z")]));
    }

    #[test]
    fn subst_term_under_binder_renames() {
        // [x/y](λx. y x) = λx'. x x'
        let m = mk_abs(vec![n("x")], mk_app(v("y"), vec![v("x")]));
        let m = m.subst(&n("y"), &v("x"));
        assert_eq!(m, mk_abs(vec![n("x'")], mk_app(v("x"), vec![v("x'")])));
    }

    #[test]
    fn subst_stops_at_shadowing_binder() {
        let m = mk_abs(vec![n("x")], v("x"));
        assert_eq!(m.subst(&n("x"), &v("z")), m);
        let f = mk_exist(n("x"), p("P", vec![v("x")]));
        assert_eq!(f.subst(&n("x"), &v("z")), f);
    }

    #[test]
    fn subst_formula_avoids_capture() {
        // [x/y](∀x. P(x, y)) = ∀x'. P(x', x)
        let f = mk_forall(n("x"), p("P", vec![v("x"), v("y")]));
        let g = f.subst(&n("y"), &v("x"));
        assert_eq!(g, mk_forall(n("x'"), p("P", vec![v("x'"), v("x")])));
    }

    #[test]
    fn subst_all_is_simultaneous() {
        let f = p("P", vec![v("x"), v("y")]);
        let subst = HashMap::from([(n("x"), v("y")), (n("y"), v("x"))]);
        assert_eq!(f.subst_all(&subst), p("P", vec![v("y"), v("x")]));
    }

    #[test]
    fn renamed_binder_avoids_substituted_names() {
        // [x/y, x'/z](∀x. P(x, y, z)): the binder must not become x'
        let f = mk_forall(n("x"), p("P", vec![v("x"), v("y"), v("z")]));
        let subst = HashMap::from([(n("y"), v("x")), (n("z"), v("x'"))]);
        let g = f.subst_all(&subst);
        assert_eq!(
            g,
            mk_forall(n("x''"), p("P", vec![v("x''"), v("x"), v("x'")]))
        );
    }

    #[test]
    fn subst_preds_instantiates() {
        // P → P with P ↦ ∀x. P(x)
        let f = mk_imply(p("P", vec![]), p("P", vec![]));
        let body = mk_forall(n("x"), p("P", vec![v("x")]));
        let preds = HashMap::from([(n("P"), Predicate::new(vec![], body.clone()))]);
        assert_eq!(f.subst_preds(&preds), Ok(mk_imply(body.clone(), body)));
    }

    #[test]
    fn subst_preds_passes_arguments() {
        let f = mk_forall(n("y"), p("R", vec![v("y")]));
        let body = mk_and(p("A", vec![v("a")]), p("B", vec![v("a")]));
        let preds = HashMap::from([(n("R"), Predicate::new(vec![n("a")], body))]);
        let g = f.subst_preds(&preds).expect("instantiation succeeds");
        assert_eq!(
            g,
            mk_forall(n("y"), mk_and(p("A", vec![v("y")]), p("B", vec![v("y")])))
        );
    }

    #[test]
    fn subst_preds_renames_capturing_binder() {
        // ∀x. R with R ↦ Q(x): the free x must not be captured
        let f = mk_forall(n("x"), p("R", vec![]));
        let preds = HashMap::from([(n("R"), Predicate::new(vec![], p("Q", vec![v("x")])))]);
        let g = f.subst_preds(&preds).expect("instantiation succeeds");
        assert_eq!(g, mk_forall(n("x'"), p("Q", vec![v("x")])));
    }

    #[test]
    fn subst_preds_propagates_errors() {
        let f = mk_or(Formula::Top, mk_exist(n("x"), p("R", vec![v("x")])));
        let preds = HashMap::from([(n("R"), Predicate::new(vec![], Formula::Bottom))]);
        let err = f.subst_preds(&preds).unwrap_err();
        assert!(err.contains("expects 0 argument"), "{err}");
    }

    #[test]
    fn arrow_and_unarrow() {
        let nat = mk_type_con(n("nat"), vec![]);
        let t = mk_type_prop().arrow([nat.clone(), nat.clone()]);
        assert_eq!(
            t,
            mk_type_arrow(nat.clone(), mk_type_arrow(nat.clone(), mk_type_prop()))
        );
        assert_eq!(t.unarrow(), (vec![nat.clone(), nat], mk_type_prop()));
    }
}
