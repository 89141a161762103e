//! Unification-based type inference for formulas and terms.
//!
//! Free identifiers receive fresh holes on first use. Holes are cells of
//! an arena owned by [`Context`]; each is assigned at most once.

use std::collections::HashMap;
use std::iter::zip;

use thiserror::Error;

use crate::env::Sig;
use crate::tt::{
    mk_type_arrow, mk_type_hole, mk_type_prop, Formula, Id, Name, Term, Type,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("type mismatch: cannot unify {left} with {right}")]
    Mismatch { left: Type, right: Type },
    #[error("occurs check failed: {hole} occurs in {ty}")]
    Occurs { hole: Type, ty: Type },
    #[error("{ty} is not a function type")]
    NotFunction { ty: Type },
    #[error("{name} : {ty} is not a predicate")]
    NotPredicate { name: Name, ty: Type },
    #[error("{name} expects {expected} argument(s) but {found} were given")]
    Arity {
        name: Name,
        expected: usize,
        found: usize,
    },
    #[error("{name} does not occur in {formula}")]
    UnknownPredicate { name: Name, formula: Formula },
    #[error("type constructor {name} is used with {found} argument(s) but expects {expected}")]
    ConArity {
        name: Name,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    cells: Vec<Option<Type>>,
    locals: HashMap<Name, Type>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Type {
        let id = Id::new(self.cells.len());
        self.cells.push(None);
        mk_type_hole(id)
    }

    /// Inferred type of `name`, with every solved hole substituted.
    pub fn get(&self, name: &Name) -> Option<Type> {
        self.locals.get(name).map(|t| self.resolve(t))
    }

    pub fn insert(&mut self, name: Name, ty: Type) -> Option<Type> {
        self.locals.insert(name, ty)
    }

    /// Runs `f` with `binders` shadowing the current bindings, then
    /// restores whatever was there before.
    pub fn scoped<R>(
        &mut self,
        binders: Vec<(Name, Type)>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let mut saved = Vec::with_capacity(binders.len());
        for (name, ty) in binders {
            let old = self.locals.insert(name.clone(), ty);
            saved.push((name, old));
        }
        let result = f(self);
        for (name, old) in saved.into_iter().rev() {
            match old {
                Some(ty) => {
                    self.locals.insert(name, ty);
                }
                None => {
                    self.locals.remove(&name);
                }
            }
        }
        result
    }

    /// Dereferences a solved hole, compressing the chain on the way.
    fn find(&mut self, t: &Type) -> Type {
        let Type::Hole(id) = t else {
            return t.clone();
        };
        let Some(content) = self.cells[id.index()].clone() else {
            return t.clone();
        };
        let repr = self.find(&content);
        self.cells[id.index()] = Some(repr.clone());
        repr
    }

    pub fn resolve(&self, t: &Type) -> Type {
        match t {
            Type::Hole(id) => match &self.cells[id.index()] {
                Some(content) => self.resolve(content),
                None => t.clone(),
            },
            Type::Var(_) | Type::Prop => t.clone(),
            Type::Con(inner) => crate::tt::mk_type_con(
                inner.name.clone(),
                inner.args.iter().map(|arg| self.resolve(arg)).collect(),
            ),
            Type::Arrow(inner) => {
                mk_type_arrow(self.resolve(&inner.dom), self.resolve(&inner.cod))
            }
        }
    }

    /// Copies `t`, resolved in another context, into this one. Unsolved
    /// holes of `t` become fresh holes here, shared through `holes`.
    pub fn transplant(&mut self, t: &Type, holes: &mut HashMap<Id, Type>) -> Type {
        match t {
            Type::Hole(id) => holes.entry(*id).or_insert_with(|| self.fresh()).clone(),
            Type::Var(_) | Type::Prop => t.clone(),
            Type::Con(inner) => crate::tt::mk_type_con(
                inner.name.clone(),
                inner
                    .args
                    .iter()
                    .map(|arg| self.transplant(arg, holes))
                    .collect(),
            ),
            Type::Arrow(inner) => {
                let dom = self.transplant(&inner.dom, holes);
                let cod = self.transplant(&inner.cod, holes);
                mk_type_arrow(dom, cod)
            }
        }
    }

    fn occurs(&mut self, id: Id, t: &Type) -> bool {
        match self.find(t) {
            Type::Hole(other) => other == id,
            Type::Var(_) | Type::Prop => false,
            Type::Con(inner) => inner.args.iter().any(|arg| self.occurs(id, arg)),
            Type::Arrow(inner) => self.occurs(id, &inner.dom) || self.occurs(id, &inner.cod),
        }
    }

    fn bind(&mut self, id: Id, t: Type) -> Result<(), TypeError> {
        if self.occurs(id, &t) {
            return Err(TypeError::Occurs {
                hole: mk_type_hole(id),
                ty: self.resolve(&t),
            });
        }
        self.cells[id.index()] = Some(t);
        Ok(())
    }

    pub fn unify(&mut self, t1: &Type, t2: &Type) -> Result<(), TypeError> {
        let t1 = self.find(t1);
        let t2 = self.find(t2);
        match (&t1, &t2) {
            (Type::Hole(i), Type::Hole(j)) if i == j => Ok(()),
            (Type::Hole(i), _) => self.bind(*i, t2),
            (_, Type::Hole(j)) => self.bind(*j, t1),
            (Type::Prop, Type::Prop) => Ok(()),
            (Type::Var(x), Type::Var(y)) if x == y => Ok(()),
            (Type::Con(c1), Type::Con(c2))
                if c1.name == c2.name && c1.args.len() == c2.args.len() =>
            {
                for (a1, a2) in zip(&c1.args, &c2.args) {
                    self.unify(a1, a2)?;
                }
                Ok(())
            }
            (Type::Arrow(a1), Type::Arrow(a2)) => {
                self.unify(&a1.dom, &a2.dom)?;
                self.unify(&a1.cod, &a2.cod)
            }
            _ => Err(TypeError::Mismatch {
                left: self.resolve(&t1),
                right: self.resolve(&t2),
            }),
        }
    }

    /// Replaces every declared type variable with its own fresh hole.
    pub fn instantiate(&mut self, t: &Type) -> Type {
        let mut vars = vec![];
        t.type_vars(&mut vars);
        if vars.is_empty() {
            return t.clone();
        }
        let subst = vars
            .into_iter()
            .map(|var| (var, self.fresh()))
            .collect::<HashMap<_, _>>();
        t.subst_vars(&subst)
    }

    /// Views `t` as `dom → cod`, inventing the arrow when `t` is a hole.
    fn match_arr(&mut self, t: &Type) -> Result<(Type, Type), TypeError> {
        match self.find(t) {
            Type::Arrow(inner) => Ok((inner.dom.clone(), inner.cod.clone())),
            Type::Hole(_) => {
                let dom = self.fresh();
                let cod = self.fresh();
                self.unify(t, &mk_type_arrow(dom.clone(), cod.clone()))?;
                Ok((dom, cod))
            }
            other => Err(TypeError::NotFunction {
                ty: self.resolve(&other),
            }),
        }
    }

    fn infer_ident(&mut self, sig: &Sig, name: &Name) -> Type {
        if let Some(t) = self.locals.get(name) {
            return t.clone();
        }
        if let Some(t) = sig.get(name) {
            return self.instantiate(t);
        }
        let t = self.fresh();
        self.locals.insert(name.clone(), t.clone());
        t
    }

    fn infer_app(&mut self, sig: &Sig, mut fun_ty: Type, args: &[Term]) -> Result<Type, TypeError> {
        for arg in args {
            let arg_ty = self.infer_term(sig, arg)?;
            let (dom, cod) = self.match_arr(&fun_ty)?;
            self.unify(&dom, &arg_ty)?;
            fun_ty = cod;
        }
        Ok(fun_ty)
    }

    pub fn infer_term(&mut self, sig: &Sig, m: &Term) -> Result<Type, TypeError> {
        match m {
            Term::Var(name) => Ok(self.infer_ident(sig, name)),
            Term::Abs(inner) => {
                let binders = inner
                    .binders
                    .iter()
                    .map(|binder| (binder.clone(), self.fresh()))
                    .collect::<Vec<_>>();
                let doms = binders.iter().map(|(_, t)| t.clone()).collect::<Vec<_>>();
                let body_ty = self.scoped(binders, |this| this.infer_term(sig, &inner.body))?;
                Ok(body_ty.arrow(doms))
            }
            Term::App(inner) => {
                let fun_ty = self.infer_term(sig, &inner.fun)?;
                self.infer_app(sig, fun_ty, &inner.args)
            }
        }
    }

    pub fn check_formula(&mut self, sig: &Sig, f: &Formula) -> Result<(), TypeError> {
        match f {
            Formula::Pred(inner) => {
                let pred_ty = self.infer_ident(sig, &inner.name);
                let result = self.infer_app(sig, pred_ty, &inner.args)?;
                self.unify(&result, &mk_type_prop())
            }
            Formula::Top | Formula::Bottom => Ok(()),
            Formula::And(inner) | Formula::Or(inner) | Formula::Imply(inner) => {
                self.check_formula(sig, &inner.lhs)?;
                self.check_formula(sig, &inner.rhs)
            }
            Formula::Forall(inner) | Formula::Exist(inner) => {
                let t = self.fresh();
                self.scoped(vec![(inner.binder.clone(), t)], |this| {
                    this.check_formula(sig, &inner.body)
                })
            }
        }
    }

    /// Argument types of the predicate `name`, which must be bound in this
    /// context to a type of the form `t₁ → ⋯ → tₙ → Prop`.
    pub fn predicate_domains(&mut self, name: &Name) -> Option<Result<Vec<Type>, TypeError>> {
        let ty = self.locals.get(name)?.clone();
        let mut doms = vec![];
        let mut current = self.find(&ty);
        while let Type::Arrow(inner) = current {
            doms.push(inner.dom.clone());
            current = self.find(&inner.cod);
        }
        if current != Type::Prop {
            return Some(Err(TypeError::NotPredicate {
                name: name.clone(),
                ty: self.resolve(&ty),
            }));
        }
        Some(Ok(doms))
    }
}

/// Checks that `formula` has sort `Prop`, recording the inferred types of
/// its free identifiers into `ctx`.
pub fn check_formula(sig: &Sig, ctx: &mut Context, formula: &Formula) -> Result<(), TypeError> {
    ctx.check_formula(sig, formula)
}

/// A declared type must use every type constructor with one arity, both
/// within itself and across the signature.
pub fn check_type(sig: &Sig, ty: &Type) -> Result<(), TypeError> {
    fn collect(t: &Type, arities: &mut HashMap<Name, usize>) -> Result<(), TypeError> {
        match t {
            Type::Var(_) | Type::Hole(_) | Type::Prop => Ok(()),
            Type::Con(inner) => {
                let expected = *arities
                    .entry(inner.name.clone())
                    .or_insert(inner.args.len());
                if expected != inner.args.len() {
                    return Err(TypeError::ConArity {
                        name: inner.name.clone(),
                        expected,
                        found: inner.args.len(),
                    });
                }
                inner.args.iter().try_for_each(|arg| collect(arg, arities))
            }
            Type::Arrow(inner) => {
                collect(&inner.dom, arities)?;
                collect(&inner.cod, arities)
            }
        }
    }

    let mut arities = HashMap::new();
    for declared in sig.values() {
        collect(declared, &mut arities)?;
    }
    collect(ty, &mut arities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse_formula, parse_type};

    fn n(s: &str) -> Name {
        Name::from_str(s)
    }

    fn sig(entries: &[(&str, &str)]) -> Sig {
        entries
            .iter()
            .map(|(name, ty)| (n(name), parse_type(ty).expect("type parses")))
            .collect()
    }

    fn check(sig: &Sig, text: &str) -> Result<Context, TypeError> {
        let f = parse_formula(text).expect("formula parses");
        let mut ctx = Context::new();
        check_formula(sig, &mut ctx, &f)?;
        Ok(ctx)
    }

    #[test]
    fn induction_principle() {
        let sig = sig(&[("zero", "nat"), ("succ", "nat → nat")]);
        let ctx = check(&sig, "P(zero) → ∀n.(P(n) → P(succ(n))) → P(n)").expect("well-typed");
        assert_eq!(ctx.get(&n("P")), Some(parse_type("nat → Prop").unwrap()));
        assert_eq!(ctx.get(&n("n")), Some(parse_type("nat").unwrap()));
        assert_eq!(ctx.get(&n("zero")), None);
    }

    #[test]
    fn propositional_variables_are_props() {
        let ctx = check(&Sig::new(), "P → Q ∨ ⊥").expect("well-typed");
        assert_eq!(ctx.get(&n("P")), Some(Type::Prop));
        assert_eq!(ctx.get(&n("Q")), Some(Type::Prop));
    }

    #[test]
    fn mismatch_names_both_types() {
        let sig = sig(&[("zero", "nat"), ("nil", "list")]);
        let err = check(&sig, "P(zero) ∧ P(nil)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "type mismatch: cannot unify nat with list"
        );
    }

    #[test]
    fn predicate_used_as_argument_is_rejected() {
        // P : ?a → Prop, then P(P) needs ?a = ?a → Prop
        let err = check(&Sig::new(), "P(P)").unwrap_err();
        assert!(matches!(err, TypeError::Occurs { .. }), "{err}");
    }

    #[test]
    fn arity_mismatch_is_a_type_error() {
        assert!(check(&Sig::new(), "P(x) ∧ P(x, y)").is_err());
        assert!(check(&Sig::new(), "P ∧ P(x)").is_err());
    }

    #[test]
    fn quantifiers_shadow_and_restore() {
        let sig = sig(&[("zero", "nat"), ("tt", "bool")]);
        let ctx = check(&sig, "Q(x, tt) ∧ ∀x. R(x, zero) ∧ ∃x. S(x)").expect("well-typed");
        assert_eq!(ctx.get(&n("x")), Some(parse_type("bool").unwrap()));
        assert_eq!(ctx.get(&n("S")).map(|t| t.unarrow().0.len()), Some(1));
    }

    #[test]
    fn polymorphic_constants_are_instantiated_per_use() {
        let sig = sig(&[
            ("nil", "list('a)"),
            ("zero", "nat"),
            ("tt", "bool"),
            ("cons", "'a → list('a) → list('a)"),
        ]);
        let ctx = check(&sig, "P(cons(zero, nil)) ∧ Q(cons(tt, nil))").expect("well-typed");
        assert_eq!(ctx.get(&n("P")), Some(parse_type("list(nat) → Prop").unwrap()));
        assert_eq!(ctx.get(&n("Q")), Some(parse_type("list(bool) → Prop").unwrap()));
    }

    #[test]
    fn lambda_terms() {
        let sig = sig(&[("zero", "nat")]);
        let ctx = check(&sig, "P(λx. f(x, zero))").expect("well-typed");
        let p = ctx.get(&n("P")).unwrap();
        let (doms, cod) = p.unarrow();
        assert_eq!(cod, Type::Prop);
        assert_eq!(doms.len(), 1);
        let f = ctx.get(&n("f")).unwrap();
        assert_eq!(f.unarrow().0.len(), 2);
        assert_eq!(ctx.get(&n("x")), None);
    }

    #[test]
    fn constant_applied_to_too_many_arguments() {
        let sig = sig(&[("zero", "nat")]);
        let err = check(&sig, "P(zero(zero))").unwrap_err();
        assert_eq!(err.to_string(), "nat is not a function type");
    }

    #[test]
    fn predicate_domains() {
        let sig = sig(&[("zero", "nat")]);
        let mut ctx = check(&sig, "R(zero, y) ∧ S").expect("well-typed");
        let doms = ctx.predicate_domains(&n("R")).unwrap().unwrap();
        assert_eq!(doms.len(), 2);
        assert_eq!(ctx.resolve(&doms[0]), parse_type("nat").unwrap());
        assert_eq!(ctx.predicate_domains(&n("S")), Some(Ok(vec![])));
        assert_eq!(ctx.predicate_domains(&n("T")), None);
        assert!(matches!(
            ctx.predicate_domains(&n("y")),
            Some(Err(TypeError::NotPredicate { .. }))
        ));
    }

    #[test]
    fn declared_types_keep_constructor_arities() {
        let sig = sig(&[("nil", "list('a)")]);
        assert!(check_type(&sig, &parse_type("list(nat) → nat").unwrap()).is_ok());
        let err = check_type(&sig, &parse_type("list → nat").unwrap()).unwrap_err();
        assert!(matches!(err, TypeError::ConArity { .. }), "{err}");
    }
}
