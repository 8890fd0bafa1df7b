//! The type graph.
//!
//! All types produced by the parser live in a single [`TypeStore`] arena and
//! are addressed through [`TypeId`] handles. The arena is created together
//! with the parser (builtins are interned up front), shared by every module
//! of a package, and frozen after linking. Cross-module links
//! (`Imported::link`) are plain `TypeId`s filled in during the link phase, so
//! the graph needs no shared-ownership smart pointers and cannot form
//! ownership cycles.

use std::sync::Arc;

use crate::ast::{DocBlock, ModuleInfo};

/// Index of a type inside the [`TypeStore`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TypeId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum BuiltinKind {
    USize,
    ISize,
    Varuint,
    Varint,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
    Void,
    Char,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 17] = [
        BuiltinKind::USize,
        BuiltinKind::ISize,
        BuiltinKind::Varuint,
        BuiltinKind::Varint,
        BuiltinKind::U8,
        BuiltinKind::I8,
        BuiltinKind::U16,
        BuiltinKind::I16,
        BuiltinKind::U32,
        BuiltinKind::I32,
        BuiltinKind::U64,
        BuiltinKind::I64,
        BuiltinKind::F32,
        BuiltinKind::F64,
        BuiltinKind::Bool,
        BuiltinKind::Void,
        BuiltinKind::Char,
    ];

    /// Surface spelling in IDL sources.
    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::USize => "usize",
            BuiltinKind::ISize => "isize",
            BuiltinKind::Varuint => "varuint",
            BuiltinKind::Varint => "varint",
            BuiltinKind::U8 => "u8",
            BuiltinKind::I8 => "i8",
            BuiltinKind::U16 => "u16",
            BuiltinKind::I16 => "i16",
            BuiltinKind::U32 => "u32",
            BuiltinKind::I32 => "i32",
            BuiltinKind::U64 => "u64",
            BuiltinKind::I64 => "i64",
            BuiltinKind::F32 => "f32",
            BuiltinKind::F64 => "f64",
            BuiltinKind::Bool => "bool",
            BuiltinKind::Void => "void",
            BuiltinKind::Char => "char",
        }
    }

    /// Capitalized spelling used by the type-name mangler.
    pub fn mangled(self) -> &'static str {
        match self {
            BuiltinKind::USize => "USize",
            BuiltinKind::ISize => "ISize",
            BuiltinKind::Varuint => "Varuint",
            BuiltinKind::Varint => "Varint",
            BuiltinKind::U8 => "U8",
            BuiltinKind::I8 => "I8",
            BuiltinKind::U16 => "U16",
            BuiltinKind::I16 => "I16",
            BuiltinKind::U32 => "U32",
            BuiltinKind::I32 => "I32",
            BuiltinKind::U64 => "U64",
            BuiltinKind::I64 => "I64",
            BuiltinKind::F32 => "F32",
            BuiltinKind::F64 => "F64",
            BuiltinKind::Bool => "Bool",
            BuiltinKind::Void => "Void",
            BuiltinKind::Char => "Char",
        }
    }

    /// C representation of the builtin.
    pub fn c_repr(self) -> &'static str {
        match self {
            BuiltinKind::USize => "size_t",
            BuiltinKind::ISize => "ptrdiff_t",
            BuiltinKind::Varuint => "uint64_t",
            BuiltinKind::Varint => "int64_t",
            BuiltinKind::U8 => "uint8_t",
            BuiltinKind::I8 => "int8_t",
            BuiltinKind::U16 => "uint16_t",
            BuiltinKind::I16 => "int16_t",
            BuiltinKind::U32 => "uint32_t",
            BuiltinKind::I32 => "int32_t",
            BuiltinKind::U64 => "uint64_t",
            BuiltinKind::I64 => "int64_t",
            BuiltinKind::F32 => "float",
            BuiltinKind::F64 => "double",
            BuiltinKind::Bool => "bool",
            BuiltinKind::Void => "void",
            BuiltinKind::Char => "char",
        }
    }

    /// Encoded width in bytes, `None` for variable-length or pointer-width
    /// encodings.
    pub fn fixed_width(self) -> Option<u64> {
        match self {
            BuiltinKind::U8 | BuiltinKind::I8 | BuiltinKind::Bool | BuiltinKind::Char => Some(1),
            BuiltinKind::U16 | BuiltinKind::I16 => Some(2),
            BuiltinKind::U32 | BuiltinKind::I32 | BuiltinKind::F32 => Some(4),
            BuiltinKind::U64 | BuiltinKind::I64 | BuiltinKind::F64 => Some(8),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReferenceKind {
    Pointer,
    Reference,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SelfArgument {
    Reference,
    MutReference,
    Value,
}

/// A named, typed slot: struct field, component parameter or function
/// argument.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
    pub doc: Option<DocBlock>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Field {
            name: name.into(),
            ty,
            doc: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EnumConstant {
    pub name: String,
    pub value: i64,
    pub is_user_set: bool,
    pub doc: Option<DocBlock>,
}

#[derive(Clone, Debug)]
pub enum VariantField {
    Constant {
        name: String,
        doc: Option<DocBlock>,
    },
    Tuple {
        name: String,
        types: Vec<TypeId>,
        doc: Option<DocBlock>,
    },
    Struct {
        name: String,
        fields: Vec<Field>,
        doc: Option<DocBlock>,
    },
}

impl VariantField {
    pub fn name(&self) -> &str {
        match self {
            VariantField::Constant { name, .. }
            | VariantField::Tuple { name, .. }
            | VariantField::Struct { name, .. } => name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FunctionType {
    pub self_arg: Option<SelfArgument>,
    pub args: Vec<Field>,
    pub ret: Option<TypeId>,
}

#[derive(Clone, Debug)]
pub enum Type {
    Builtin(BuiltinKind),
    Reference {
        kind: ReferenceKind,
        is_mutable: bool,
        pointee: TypeId,
    },
    Array {
        len: u64,
        element: TypeId,
    },
    DynArray {
        max_size: u64,
        element: TypeId,
        module: Arc<ModuleInfo>,
    },
    Function(FunctionType),
    Enum {
        name: String,
        module: Arc<ModuleInfo>,
        constants: Vec<EnumConstant>,
    },
    Struct {
        name: String,
        module: Arc<ModuleInfo>,
        fields: Vec<Field>,
    },
    Variant {
        name: String,
        module: Arc<ModuleInfo>,
        fields: Vec<VariantField>,
    },
    Imported {
        name: String,
        import_path: String,
        module: Arc<ModuleInfo>,
        link: Option<TypeId>,
    },
    Alias {
        name: String,
        module: Arc<ModuleInfo>,
        referent: TypeId,
    },
    Generic {
        name: String,
        module: Arc<ModuleInfo>,
        parameters: Vec<TypeId>,
        body: TypeId,
    },
    GenericInstantiation {
        generic: TypeId,
        generic_name: String,
        module: Arc<ModuleInfo>,
        substitutions: Vec<TypeId>,
        instantiated: TypeId,
    },
    GenericParameter {
        name: String,
    },
}

impl Type {
    /// Declared name for named kinds.
    pub fn name(&self) -> Option<&str> {
        match self {
            Type::Enum { name, .. }
            | Type::Struct { name, .. }
            | Type::Variant { name, .. }
            | Type::Imported { name, .. }
            | Type::Alias { name, .. }
            | Type::Generic { name, .. }
            | Type::GenericParameter { name } => Some(name),
            _ => None,
        }
    }

    pub fn module(&self) -> Option<&Arc<ModuleInfo>> {
        match self {
            Type::DynArray { module, .. }
            | Type::Enum { module, .. }
            | Type::Struct { module, .. }
            | Type::Variant { module, .. }
            | Type::Imported { module, .. }
            | Type::Alias { module, .. }
            | Type::Generic { module, .. }
            | Type::GenericInstantiation { module, .. } => Some(module),
            _ => None,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(
            self,
            Type::Enum { .. }
                | Type::Struct { .. }
                | Type::Variant { .. }
                | Type::Imported { .. }
                | Type::Alias { .. }
                | Type::Generic { .. }
        )
    }
}

/// Arena holding every type of a compilation.
#[derive(Debug, Default)]
pub struct TypeStore {
    types: Vec<Type>,
    builtins: Vec<TypeId>,
}

/// Alias chains longer than this are treated as cycles.
const RESOLVE_BUDGET: usize = 64;

impl TypeStore {
    pub fn new() -> Self {
        let mut store = TypeStore {
            types: Vec::new(),
            builtins: Vec::new(),
        };
        for kind in BuiltinKind::ALL {
            let id = store.add(Type::Builtin(kind));
            store.builtins.push(id);
        }
        store
    }

    pub fn add(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    pub fn builtin(&self, kind: BuiltinKind) -> TypeId {
        self.builtins[BuiltinKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap()]
    }

    pub fn builtin_by_name(&self, name: &str) -> Option<TypeId> {
        BuiltinKind::ALL
            .iter()
            .find(|k| k.name() == name)
            .map(|k| self.builtin(*k))
    }

    /// Walk alias referents and import links until a terminal kind is
    /// reached. Returns `None` for unresolved imports and for alias cycles.
    pub fn resolve_final(&self, id: TypeId) -> Option<TypeId> {
        let mut current = id;
        for _ in 0..RESOLVE_BUDGET {
            match self.get(current) {
                Type::Alias { referent, .. } => current = *referent,
                Type::Imported { link, .. } => current = (*link)?,
                _ => return Some(current),
            }
        }
        None
    }

    /// Structural equality over resolved terminal kinds: named types compare
    /// by name plus contents, arrays include their length, dyn arrays ignore
    /// their bound.
    pub fn equals(&self, a: TypeId, b: TypeId) -> bool {
        let (Some(a), Some(b)) = (self.resolve_final(a), self.resolve_final(b)) else {
            return false;
        };
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Type::Builtin(l), Type::Builtin(r)) => l == r,
            (
                Type::Reference {
                    kind: lk,
                    is_mutable: lm,
                    pointee: lp,
                },
                Type::Reference {
                    kind: rk,
                    is_mutable: rm,
                    pointee: rp,
                },
            ) => lm == rm && lk == rk && self.equals(*lp, *rp),
            (
                Type::Array {
                    len: ll,
                    element: le,
                },
                Type::Array {
                    len: rl,
                    element: re,
                },
            ) => ll == rl && self.equals(*le, *re),
            // Max size is a codegen property, not part of the type identity.
            (Type::DynArray { element: le, .. }, Type::DynArray { element: re, .. }) => {
                self.equals(*le, *re)
            }
            (Type::Function(l), Type::Function(r)) => {
                if l.self_arg != r.self_arg {
                    return false;
                }
                match (l.ret, r.ret) {
                    (Some(lr), Some(rr)) => {
                        if !self.equals(lr, rr) {
                            return false;
                        }
                    }
                    (None, None) => {}
                    _ => return false,
                }
                l.args.len() == r.args.len()
                    && l.args
                        .iter()
                        .zip(&r.args)
                        .all(|(lf, rf)| lf.name == rf.name && self.equals(lf.ty, rf.ty))
            }
            (
                Type::Enum {
                    name: ln,
                    constants: lc,
                    ..
                },
                Type::Enum {
                    name: rn,
                    constants: rc,
                    ..
                },
            ) => {
                ln == rn
                    && lc.len() == rc.len()
                    && lc.iter().zip(rc).all(|(l, r)| {
                        l.is_user_set == r.is_user_set && l.value == r.value
                    })
            }
            (
                Type::Struct {
                    name: ln,
                    fields: lf,
                    ..
                },
                Type::Struct {
                    name: rn,
                    fields: rf,
                    ..
                },
            ) => {
                ln == rn
                    && lf.len() == rf.len()
                    && lf
                        .iter()
                        .zip(rf)
                        .all(|(l, r)| l.name == r.name && self.equals(l.ty, r.ty))
            }
            (
                Type::Variant {
                    name: ln,
                    fields: lf,
                    ..
                },
                Type::Variant {
                    name: rn,
                    fields: rf,
                    ..
                },
            ) => {
                ln == rn
                    && lf.len() == rf.len()
                    && lf.iter().zip(rf).all(|(l, r)| l.name() == r.name())
            }
            (Type::GenericInstantiation { instantiated: l, .. }, _) => self.equals(*l, b),
            (_, Type::GenericInstantiation { instantiated: r, .. }) => self.equals(a, *r),
            _ => false,
        }
    }

    /// Encoded size in bytes when the encoding is position independent of the
    /// value, `None` otherwise. Pointer width is a target option (bytes).
    pub fn fixed_size(&self, id: TypeId, ptr_width: u64) -> Option<u64> {
        let id = self.resolve_final(id)?;
        match self.get(id) {
            Type::Builtin(kind) => match kind {
                BuiltinKind::USize | BuiltinKind::ISize => Some(ptr_width),
                other => other.fixed_width(),
            },
            Type::Reference { .. } | Type::Function(_) => Some(ptr_width),
            Type::Array { len, element } => {
                self.fixed_size(*element, ptr_width).map(|s| s * len)
            }
            Type::Struct { fields, .. } => {
                let mut total = 0u64;
                for field in fields {
                    total += self.fixed_size(field.ty, ptr_width)?;
                }
                Some(total)
            }
            Type::GenericInstantiation { instantiated, .. } => {
                self.fixed_size(*instantiated, ptr_width)
            }
            _ => None,
        }
    }

    /// Structural copy of a generic body with parameters substituted
    /// positionally. Builtins, enums and imported links are shared; every
    /// other composite gets a fresh node.
    pub fn clone_and_substitute(
        &mut self,
        body: TypeId,
        parameters: &[TypeId],
        substitutions: &[TypeId],
    ) -> TypeId {
        debug_assert_eq!(parameters.len(), substitutions.len());
        match self.get(body).clone() {
            Type::Builtin(_) | Type::Enum { .. } | Type::Imported { .. } => body,
            Type::GenericParameter { name } => {
                for (param, sub) in parameters.iter().zip(substitutions) {
                    if self.get(*param).name() == Some(name.as_str()) {
                        return *sub;
                    }
                }
                body
            }
            Type::Reference {
                kind,
                is_mutable,
                pointee,
            } => {
                let pointee = self.clone_and_substitute(pointee, parameters, substitutions);
                self.add(Type::Reference {
                    kind,
                    is_mutable,
                    pointee,
                })
            }
            Type::Array { len, element } => {
                let element = self.clone_and_substitute(element, parameters, substitutions);
                self.add(Type::Array { len, element })
            }
            Type::DynArray {
                max_size,
                element,
                module,
            } => {
                let element = self.clone_and_substitute(element, parameters, substitutions);
                self.add(Type::DynArray {
                    max_size,
                    element,
                    module,
                })
            }
            Type::Function(func) => {
                let mut args = Vec::with_capacity(func.args.len());
                for f in &func.args {
                    args.push(Field {
                        name: f.name.clone(),
                        ty: self.clone_and_substitute(f.ty, parameters, substitutions),
                        doc: f.doc.clone(),
                    });
                }
                let ret = func
                    .ret
                    .map(|r| self.clone_and_substitute(r, parameters, substitutions));
                self.add(Type::Function(FunctionType {
                    self_arg: func.self_arg,
                    args,
                    ret,
                }))
            }
            Type::Struct {
                name,
                module,
                fields,
            } => {
                let mut subst_fields = Vec::with_capacity(fields.len());
                for f in &fields {
                    subst_fields.push(Field {
                        name: f.name.clone(),
                        ty: self.clone_and_substitute(f.ty, parameters, substitutions),
                        doc: f.doc.clone(),
                    });
                }
                self.add(Type::Struct {
                    name,
                    module,
                    fields: subst_fields,
                })
            }
            Type::Variant {
                name,
                module,
                fields,
            } => {
                let mut subst_fields = Vec::with_capacity(fields.len());
                for f in &fields {
                    let field = match f {
                        VariantField::Constant { name, doc } => VariantField::Constant {
                            name: name.clone(),
                            doc: doc.clone(),
                        },
                        VariantField::Tuple { name, types, doc } => {
                            let mut subst_types = Vec::with_capacity(types.len());
                            for t in types {
                                subst_types.push(self.clone_and_substitute(
                                    *t,
                                    parameters,
                                    substitutions,
                                ));
                            }
                            VariantField::Tuple {
                                name: name.clone(),
                                types: subst_types,
                                doc: doc.clone(),
                            }
                        }
                        VariantField::Struct { name, fields, doc } => {
                            let mut inner = Vec::with_capacity(fields.len());
                            for f in fields {
                                inner.push(Field {
                                    name: f.name.clone(),
                                    ty: self.clone_and_substitute(
                                        f.ty,
                                        parameters,
                                        substitutions,
                                    ),
                                    doc: f.doc.clone(),
                                });
                            }
                            VariantField::Struct {
                                name: name.clone(),
                                fields: inner,
                                doc: doc.clone(),
                            }
                        }
                    };
                    subst_fields.push(field);
                }
                self.add(Type::Variant {
                    name,
                    module,
                    fields: subst_fields,
                })
            }
            Type::Alias {
                name,
                module,
                referent,
            } => {
                let referent = self.clone_and_substitute(referent, parameters, substitutions);
                self.add(Type::Alias {
                    name,
                    module,
                    referent,
                })
            }
            Type::Generic { .. } | Type::GenericInstantiation { .. } => body,
        }
    }

    /// Whether any [`Type::GenericParameter`] remains reachable from `id`.
    pub fn contains_generic_parameter(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::GenericParameter { .. } => true,
            Type::Builtin(_) | Type::Enum { .. } | Type::Imported { .. } => false,
            Type::Reference { pointee, .. } => self.contains_generic_parameter(*pointee),
            Type::Array { element, .. } | Type::DynArray { element, .. } => {
                self.contains_generic_parameter(*element)
            }
            Type::Function(func) => {
                func.args.iter().any(|f| self.contains_generic_parameter(f.ty))
                    || func.ret.is_some_and(|r| self.contains_generic_parameter(r))
            }
            Type::Struct { fields, .. } => {
                fields.iter().any(|f| self.contains_generic_parameter(f.ty))
            }
            Type::Variant { fields, .. } => fields.iter().any(|f| match f {
                VariantField::Constant { .. } => false,
                VariantField::Tuple { types, .. } => {
                    types.iter().any(|t| self.contains_generic_parameter(*t))
                }
                VariantField::Struct { fields, .. } => {
                    fields.iter().any(|f| self.contains_generic_parameter(f.ty))
                }
            }),
            Type::Alias { referent, .. } => self.contains_generic_parameter(*referent),
            Type::Generic { body, .. } => self.contains_generic_parameter(*body),
            Type::GenericInstantiation { instantiated, .. } => {
                self.contains_generic_parameter(*instantiated)
            }
        }
    }
}
