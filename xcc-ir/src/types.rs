//! IR Type Universe
//!
//! Types are immutable descriptors interned through a [`TypePool`].
//! Two types obtained from the same pool are equal iff they are the
//! same handle, so passes may compare them with `Rc::ptr_eq` or plain
//! `==` interchangeably. Sizes and alignment follow the x86-64
//! System V data model.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Interned handle to an IR type
pub type TypeRef = Rc<IrType>;

/// IR type descriptors
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,

    /// Integer with bit width 1, 8, 16, 32 or 64
    Int { width: u8, signed: bool },

    /// Floating point, width 32 or 64
    Float { width: u8 },

    Ptr {
        pointee: TypeRef,
    },

    Array {
        len: u64,
        elem: TypeRef,
        variable_len: bool,
        static_hint: bool,
    },

    Func {
        ret: TypeRef,
        params: Vec<TypeRef>,
        variadic: bool,
    },
}

impl IrType {
    /// Size in bytes. Void and function types have no size.
    pub fn size(&self) -> u64 {
        match self {
            IrType::Void | IrType::Func { .. } => 0,
            IrType::Int { width, .. } => (*width as u64).div_ceil(8),
            IrType::Float { width } => *width as u64 / 8,
            IrType::Ptr { .. } => 8,
            IrType::Array { len, elem, .. } => len * elem.size(),
        }
    }

    /// Alignment in bytes. Scalars align to their size; arrays to
    /// their element alignment.
    pub fn align(&self) -> u64 {
        match self {
            IrType::Void | IrType::Func { .. } => 1,
            IrType::Int { .. } | IrType::Float { .. } | IrType::Ptr { .. } => self.size().max(1),
            IrType::Array { elem, .. } => elem.align(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, IrType::Int { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::Float { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, IrType::Array { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, IrType::Func { .. })
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, IrType::Int { signed: true, .. })
    }

    /// The pointee of a pointer, or the element of an array
    pub fn inner(&self) -> Option<&TypeRef> {
        match self {
            IrType::Ptr { pointee } => Some(pointee),
            IrType::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// Return type of a function type
    pub fn return_type(&self) -> Option<&TypeRef> {
        match self {
            IrType::Func { ret, .. } => Some(ret),
            _ => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Int { width: 1, .. } => write!(f, "i1"),
            IrType::Int {
                width,
                signed: true,
            } => write!(f, "i{width}"),
            IrType::Int {
                width,
                signed: false,
            } => write!(f, "u{width}"),
            IrType::Float { width } => write!(f, "f{width}"),
            IrType::Ptr { pointee } => write!(f, "{pointee}*"),
            IrType::Array { len, elem, .. } => write!(f, "[{len} x {elem}]"),
            IrType::Func {
                ret,
                params,
                variadic,
            } => {
                write!(f, "{ret} (")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                if *variadic {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Deduplicating pool of type descriptors. Each module and each
/// function owns one; a pool only grows and is dropped as a unit with
/// its owner.
#[derive(Debug, Clone, Default)]
pub struct TypePool {
    pool: HashSet<TypeRef>,
}

impl TypePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a descriptor, returning the canonical handle
    pub fn get(&mut self, ty: IrType) -> TypeRef {
        if let Some(existing) = self.pool.get(&ty) {
            return existing.clone();
        }
        let interned: TypeRef = Rc::new(ty);
        self.pool.insert(interned.clone());
        interned
    }

    pub fn void(&mut self) -> TypeRef {
        self.get(IrType::Void)
    }

    pub fn int(&mut self, width: u8, signed: bool) -> TypeRef {
        debug_assert!(matches!(width, 1 | 8 | 16 | 32 | 64));
        self.get(IrType::Int { width, signed })
    }

    /// The `i1` comparison result type. Kept unsigned so widening is
    /// always a zero extension.
    pub fn bool(&mut self) -> TypeRef {
        self.int(1, false)
    }

    pub fn float(&mut self, width: u8) -> TypeRef {
        debug_assert!(matches!(width, 32 | 64));
        self.get(IrType::Float { width })
    }

    pub fn ptr_to(&mut self, pointee: TypeRef) -> TypeRef {
        self.get(IrType::Ptr { pointee })
    }

    pub fn array_of(&mut self, len: u64, elem: TypeRef) -> TypeRef {
        self.get(IrType::Array {
            len,
            elem,
            variable_len: false,
            static_hint: false,
        })
    }

    pub fn func_of(&mut self, ret: TypeRef, params: Vec<TypeRef>, variadic: bool) -> TypeRef {
        self.get(IrType::Func {
            ret,
            params,
            variadic,
        })
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_dedupes() {
        let mut pool = TypePool::new();
        let a = pool.int(32, true);
        let b = pool.int(32, true);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);

        let c = pool.int(32, false);
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_compound_interning() {
        let mut pool = TypePool::new();
        let i64t = pool.int(64, true);
        let p1 = pool.ptr_to(i64t.clone());
        let p2 = pool.ptr_to(i64t);
        assert!(Rc::ptr_eq(&p1, &p2));
    }

    #[test]
    fn test_sizes_and_alignment() {
        let mut pool = TypePool::new();
        assert_eq!(pool.int(1, true).size(), 1);
        assert_eq!(pool.int(16, false).size(), 2);
        assert_eq!(pool.float(64).size(), 8);

        let i32t = pool.int(32, true);
        let arr = pool.array_of(5, i32t.clone());
        assert_eq!(arr.size(), 20);
        assert_eq!(arr.align(), 4);

        let p = pool.ptr_to(arr);
        assert_eq!(p.size(), 8);
        assert_eq!(p.align(), 8);
    }

    #[test]
    fn test_display() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let u64t = pool.int(64, false);
        let p = pool.ptr_to(i32t.clone());
        let f = pool.func_of(i32t, vec![p.clone(), u64t], true);
        assert_eq!(p.to_string(), "i32*");
        assert_eq!(f.to_string(), "i32 (i32*, u64, ...)");
    }
}
