use crate::tt::{Formula, Name, Type};

/// Declared constants and their types.
pub type Sig = im::HashMap<Name, Type>;

/// Theorems, axioms, constants and imported packages in scope. Cloning is
/// cheap; every history frame keeps its own snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    pub thms: im::HashMap<Name, Formula>,
    pub types: Sig,
    pub packages: im::HashSet<String>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_thm(&self, name: Name, formula: Formula) -> Env {
        Env {
            thms: self.thms.update(name, formula),
            ..self.clone()
        }
    }

    pub fn add_type(&self, name: Name, ty: Type) -> Env {
        Env {
            types: self.types.update(name, ty),
            ..self.clone()
        }
    }

    pub fn thm(&self, name: &Name) -> Option<&Formula> {
        self.thms.get(name)
    }

    pub fn ty(&self, name: &Name) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn add_package(&self, package: &str) -> Env {
        Env {
            packages: self.packages.update(package.to_owned()),
            ..self.clone()
        }
    }

    pub fn has_package(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    /// Whether `name` is already taken by a theorem or a constant.
    pub fn is_defined(&self, name: &Name) -> bool {
        self.thms.contains_key(name) || self.types.contains_key(name)
    }

    /// Unions `other` into `self`. Fails with the first name both sides
    /// define differently.
    pub fn merge(&self, other: &Env) -> Result<Env, Name> {
        let mut env = self.clone();
        for (name, formula) in &other.thms {
            match env.thms.get(name) {
                Some(existing) if existing == formula => {}
                Some(_) => return Err(name.clone()),
                None if env.types.contains_key(name) => return Err(name.clone()),
                None => {
                    env.thms.insert(name.clone(), formula.clone());
                }
            }
        }
        for (name, ty) in &other.types {
            match env.types.get(name) {
                Some(existing) if existing == ty => {}
                Some(_) => return Err(name.clone()),
                None if env.thms.contains_key(name) => return Err(name.clone()),
                None => {
                    env.types.insert(name.clone(), ty.clone());
                }
            }
        }
        env.packages = env.packages.union(other.packages.clone());
        Ok(env)
    }
}
