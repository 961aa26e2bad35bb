//! AST-to-IR translation
//!
//! [`IrGen`] walks the AST and emits IR through a [`FuncBuilder`]
//! cursor. Expression types are computed on the fly; static errors go
//! to the [`ErrorReporter`] and lowering continues so that one run
//! collects as many diagnostics as possible.

mod expr;
mod globals;
mod stmt;

use crate::builder::{FuncBuilder, InstrSite};
use crate::function::Function;
use crate::instructions::BlockLabel;
use crate::module::Module;
use crate::types::{TypePool, TypeRef};
use crate::values::Register;
use std::collections::HashMap;
use xcc_common::{CompilerError, DiagnosticKind, ErrorReporter, SourceLocation};
use xcc_frontend::{FunctionDef, TopLevelItem, TranslationUnit, Type};

/// What a name resolves to
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    /// Automatic variable: the alloca holding it
    Local { addr: Register },
    /// File-scope or static variable: symbol name (without `@`) and
    /// value type
    Global { symbol: String, ty: TypeRef },
    /// Function symbol
    Func { symbol: String, ty: TypeRef },
}

#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    scopes: Vec<HashMap<String, Binding>>,
}

impl ScopeStack {
    fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub(crate) fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub(crate) fn pop(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn bind(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), binding);
        }
    }

    pub(crate) fn bind_global(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.insert(name.to_string(), binding);
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }
}

/// Pending switch statement state
pub(crate) struct SwitchCtx {
    pub(crate) site: InstrSite,
    pub(crate) default_blk: Option<BlockLabel>,
    pub(crate) scrutinee_ty: TypeRef,
}

pub struct IrGen<'a> {
    pub(crate) module: Module,
    pub(crate) reporter: &'a mut ErrorReporter,
    pub(crate) scopes: ScopeStack,
    pub(crate) b: Option<FuncBuilder>,
    pub(crate) breaks: Vec<BlockLabel>,
    pub(crate) continues: Vec<BlockLabel>,
    pub(crate) switches: Vec<SwitchCtx>,
    static_counter: u32,
}

impl<'a> IrGen<'a> {
    pub fn new(module_name: &str, reporter: &'a mut ErrorReporter) -> Self {
        Self {
            module: Module::new(module_name),
            reporter,
            scopes: ScopeStack::new(),
            b: None,
            breaks: Vec::new(),
            continues: Vec::new(),
            switches: Vec::new(),
            static_counter: 0,
        }
    }

    /// Translate a parsed unit into an IR module
    pub fn generate(mut self, unit: &TranslationUnit) -> Result<Module, CompilerError> {
        for item in &unit.items {
            match item {
                TopLevelItem::Function(func) => self.lower_function(func)?,
                TopLevelItem::Declaration(decl) => {
                    if decl.ty.is_function() {
                        self.declare_function(&decl.name, &decl.ty, false, false)?;
                    } else {
                        self.lower_global(decl)?;
                    }
                }
            }
        }
        Ok(self.module)
    }

    pub(crate) fn b_mut(&mut self) -> Result<&mut FuncBuilder, CompilerError> {
        self.b
            .as_mut()
            .ok_or_else(|| CompilerError::internal("IR emission outside of a function"))
    }

    pub(crate) fn diag(
        &mut self,
        kind: DiagnosticKind,
        loc: &SourceLocation,
        message: impl Into<String>,
    ) {
        self.reporter.report(kind, Some(loc.clone()), message);
    }

    /// Declare a function symbol without a body
    fn declare_function(
        &mut self,
        name: &str,
        ty: &Type,
        is_inline: bool,
        is_noreturn: bool,
    ) -> Result<TypeRef, CompilerError> {
        let ir_ty = ctype_to_ir(&mut self.module.types, ty);
        self.scopes.bind_global(
            name,
            Binding::Func {
                symbol: name.to_string(),
                ty: ir_ty.clone(),
            },
        );
        if self.module.get_function(name).is_none() {
            let mut func = Function::new(name, ir_ty.clone());
            func.is_inline = is_inline;
            func.is_noreturn = is_noreturn;
            self.module.add_func(func);
        }
        Ok(ir_ty)
    }

    fn lower_function(&mut self, def: &FunctionDef) -> Result<(), CompilerError> {
        let ir_ty = self.declare_function(&def.name, &def.ty, def.is_inline, def.is_noreturn)?;
        let params = match &def.ty {
            Type::Function { params, .. } => params.clone(),
            _ => return Err(CompilerError::internal("function definition without type")),
        };

        let mut func = Function::new(&def.name, ir_ty);
        func.is_inline = def.is_inline;
        func.is_noreturn = def.is_noreturn;
        let ret_ty = func.return_type().clone();

        let mut b = FuncBuilder::new(func);

        // parameter registers come first so they get the lowest names
        let mut param_regs = Vec::new();
        for (_, pty) in &params {
            let ir_pty = ctype_to_ir(&mut b.func_mut().types, pty);
            let reg = b.new_reg(ir_pty);
            param_regs.push(reg);
        }
        b.func_mut().params = param_regs.clone();

        let entry = b.new_block();
        b.switch_to(entry);

        if !ret_ty.is_void() {
            let slot = b.build_alloca(ret_ty)?;
            b.func_mut().return_slot = Some(slot);
        }

        self.b = Some(b);
        self.scopes.push();

        // spill parameters so every later reference is a load
        for (reg, (pname, _)) in param_regs.into_iter().zip(&params) {
            let addr = self.b_mut()?.build_alloca(reg.ty.clone())?;
            self.b_mut()?
                .build_store(crate::values::Operand::Reg(reg), crate::values::Operand::Reg(addr.clone()))?;
            if let Some(pname) = pname {
                self.scopes.bind(pname, Binding::Local { addr });
            }
        }

        self.lower_stmt(&def.body)?;

        self.scopes.pop();
        let mut b = self.b.take().ok_or_else(|| {
            CompilerError::internal("function builder disappeared during lowering")
        })?;
        let unresolved = b.epilog()?;
        for (label, loc) in unresolved {
            self.diag(
                DiagnosticKind::UnresolvedLabel,
                &loc,
                format!("no label '{label}' in function '{}'", def.name),
            );
        }

        self.module.add_func(b.finish());
        Ok(())
    }

    /// A unique symbol for a function-scope `static`
    pub(crate) fn static_symbol(&mut self, name: &str) -> String {
        let n = self.static_counter;
        self.static_counter += 1;
        format!("{name}.{n}")
    }
}

/// Map a source-level type onto the IR type universe
pub fn ctype_to_ir(pool: &mut TypePool, ty: &Type) -> TypeRef {
    match ty {
        Type::Void => pool.void(),
        Type::Bool => pool.bool(),
        Type::Char { signed } => pool.int(8, *signed),
        Type::Short { signed } => pool.int(16, *signed),
        Type::Int { signed } => pool.int(32, *signed),
        Type::Long { signed } | Type::LongLong { signed } => pool.int(64, *signed),
        Type::Float => pool.float(32),
        Type::Double => pool.float(64),
        Type::Pointer(inner) => {
            let pointee = ctype_to_ir(pool, inner);
            pool.ptr_to(pointee)
        }
        Type::Array { elem, len } => {
            let elem = ctype_to_ir(pool, elem);
            pool.array_of(len.unwrap_or(0), elem)
        }
        Type::Function {
            ret,
            params,
            variadic,
        } => {
            let ret = ctype_to_ir(pool, ret);
            let params = params.iter().map(|(_, t)| ctype_to_ir(pool, t)).collect();
            pool.func_of(ret, params, *variadic)
        }
    }
}
