//! Modules and global variables
//!
//! A module owns its top-level symbols in declaration order, plus an
//! index from name to position. Each symbol is either a function or a
//! global variable with a folded initializer.

use crate::function::Function;
use crate::inittree::InitTree;
use crate::types::{TypePool, TypeRef};
use std::collections::HashMap;
use std::fmt;

/// A global variable with its folded initializer. `None` means
/// zero-initialized (`.bss`).
#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: String,
    pub ty: TypeRef,
    pub init: Option<InitTree>,
    /// Internal linkage (`static` at file scope)
    pub is_static: bool,
    /// Declared `extern`: no storage is emitted here
    pub is_extern: bool,
}

impl GlobalVar {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            init: None,
            is_static: false,
            is_extern: false,
        }
    }
}

impl fmt::Display for GlobalVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.init {
            Some(tree) => write!(f, "{} @{} = {};", self.ty, self.name, tree),
            None => write!(f, "{} @{};", self.ty, self.name),
        }
    }
}

/// A top-level symbol
#[derive(Debug, Clone)]
pub enum Symbol {
    Func(Function),
    Global(GlobalVar),
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Func(f) => &f.name,
            Symbol::Global(g) => &g.name,
        }
    }

    pub fn as_func(&self) -> Option<&Function> {
        match self {
            Symbol::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<&GlobalVar> {
        match self {
            Symbol::Global(g) => Some(g),
            _ => None,
        }
    }
}

/// A complete compilation unit
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    symbols: Vec<Symbol>,
    index: HashMap<String, usize>,
    /// Module-level pool; function types live here
    pub types: TypePool,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: Vec::new(),
            index: HashMap::new(),
            types: TypePool::new(),
        }
    }

    pub fn add_func(&mut self, func: Function) -> &mut Function {
        let name = func.name.clone();
        // a definition replaces an earlier extern declaration
        if let Some(&pos) = self.index.get(&name) {
            self.symbols[pos] = Symbol::Func(func);
            match &mut self.symbols[pos] {
                Symbol::Func(f) => return f,
                _ => unreachable!(),
            }
        }
        self.index.insert(name, self.symbols.len());
        self.symbols.push(Symbol::Func(func));
        match self.symbols.last_mut() {
            Some(Symbol::Func(f)) => f,
            _ => unreachable!(),
        }
    }

    pub fn add_global(&mut self, var: GlobalVar) -> &mut GlobalVar {
        // a defining declaration replaces a tentative one
        if let Some(&pos) = self.index.get(&var.name) {
            if var.init.is_some() || self.symbols[pos].as_global().is_none() {
                self.symbols[pos] = Symbol::Global(var);
            }
            match &mut self.symbols[pos] {
                Symbol::Global(g) => return g,
                _ => unreachable!(),
            }
        }
        self.index.insert(var.name.clone(), self.symbols.len());
        self.symbols.push(Symbol::Global(var));
        match self.symbols.last_mut() {
            Some(Symbol::Global(g)) => g,
            _ => unreachable!(),
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.index
            .get(name)
            .and_then(|&i| self.symbols[i].as_func())
    }

    pub fn get_global(&self, name: &str) -> Option<&GlobalVar> {
        self.index
            .get(name)
            .and_then(|&i| self.symbols[i].as_global())
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.symbols.iter().filter_map(Symbol::as_func)
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalVar> {
        self.symbols.iter().filter_map(Symbol::as_global)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}:", self.name)?;
        for sym in &self.symbols {
            match sym {
                Symbol::Func(func) => writeln!(f, "{func}\n")?,
                Symbol::Global(var) => writeln!(f, "{var}\n")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Operand;

    #[test]
    fn test_symbol_lookup() {
        let mut module = Module::new("unit");
        let i32t = module.types.int(32, true);
        let fty = module.types.func_of(i32t.clone(), vec![], false);

        module.add_func(Function::new("main", fty));
        let mut g = GlobalVar::new("counter", i32t.clone());
        g.init = Some(InitTree::Const(Operand::int(20, i32t)));
        module.add_global(g);

        assert!(module.get_function("main").is_some());
        assert!(module.get_global("counter").is_some());
        assert!(module.get_function("counter").is_none());
        assert!(module.get_global("missing").is_none());
    }

    #[test]
    fn test_definition_replaces_extern() {
        let mut module = Module::new("unit");
        let i32t = module.types.int(32, true);
        let fty = module.types.func_of(i32t, vec![], false);

        module.add_func(Function::new("f", fty.clone()));
        assert!(module.get_function("f").unwrap().is_external());

        let mut def = Function::new("f", fty);
        def.add_block(crate::blocks::BasicBlock::new(0));
        module.add_func(def);
        assert!(!module.get_function("f").unwrap().is_external());
        assert_eq!(module.symbols().len(), 1);
    }
}
