//! C and C++ representations of types, with declarator handling for arrays,
//! pointers and function pointers.

use crate::generator::type_name::type_name;
use crate::types::{Type, TypeId, TypeStore};

/// Onboard C representation without a declarator name.
pub fn onboard_type_repr(store: &TypeStore, id: TypeId) -> String {
    onboard_field_repr(store, id, "")
}

/// Onboard C representation declaring `name` (field, variable or argument).
pub fn onboard_field_repr(store: &TypeStore, id: TypeId, name: &str) -> String {
    repr(store, id, name.to_string())
}

fn join(base: &str, decl: &str) -> String {
    if decl.is_empty() {
        base.to_string()
    } else if decl.starts_with('*') || decl.starts_with(' ') || decl.starts_with('[') {
        format!("{base}{decl}")
    } else {
        format!("{base} {decl}")
    }
}

fn repr(store: &TypeStore, id: TypeId, decl: String) -> String {
    match store.get(id) {
        Type::Builtin(kind) => join(kind.c_repr(), &decl),
        Type::Enum { .. }
        | Type::Struct { .. }
        | Type::Variant { .. }
        | Type::DynArray { .. }
        | Type::GenericInstantiation { .. } => {
            let base = format!("Photon{}", type_name(store, id));
            join(&base, &decl)
        }
        Type::Imported { link, .. } => match link {
            Some(link) => repr(store, *link, decl),
            None => join("void", &decl),
        },
        Type::Alias { referent, .. } => repr(store, *referent, decl),
        Type::Reference {
            is_mutable,
            pointee,
            ..
        } => {
            let suffix = if decl.is_empty() {
                String::new()
            } else {
                format!(" {decl}")
            };
            let decl = if *is_mutable {
                format!("*{suffix}")
            } else {
                format!(" const*{suffix}")
            };
            repr(store, *pointee, decl)
        }
        Type::Array { len, element } => {
            let decl = format!("{decl}[{len}]");
            repr(store, *element, decl)
        }
        Type::Function(func) => {
            let args = if func.args.is_empty() {
                "void".to_string()
            } else {
                func.args
                    .iter()
                    .map(|a| repr(store, a.ty, String::new()))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let decl = format!("(*{decl})({args})");
            match func.ret {
                Some(ret) => repr(store, ret, decl),
                None => join("void", &decl),
            }
        }
        Type::Generic { name, .. } | Type::GenericParameter { name } => join(name, &decl),
    }
}

/// Ground control C++ representation without a declarator name.
pub fn gc_type_repr(store: &TypeStore, id: TypeId) -> String {
    match store.get(id) {
        Type::Builtin(kind) => kind.c_repr().to_string(),
        Type::Enum { name, module, .. }
        | Type::Struct { name, module, .. }
        | Type::Variant { name, module, .. } => {
            format!("photongen::{}::{}", module.name(), name)
        }
        Type::DynArray { element, .. } => {
            format!("std::vector<{}>", gc_type_repr(store, *element))
        }
        Type::Array { len, element } => {
            format!("std::array<{}, {}>", gc_type_repr(store, *element), len)
        }
        Type::Reference {
            is_mutable,
            pointee,
            ..
        } => {
            if *is_mutable {
                format!("{}*", gc_type_repr(store, *pointee))
            } else {
                format!("const {}*", gc_type_repr(store, *pointee))
            }
        }
        Type::Function(_) => "void*".to_string(),
        Type::Imported { link, .. } => match link {
            Some(link) => gc_type_repr(store, *link),
            None => "void".to_string(),
        },
        Type::Alias { referent, .. } => gc_type_repr(store, *referent),
        Type::GenericInstantiation { .. } => {
            format!("photongen::{}", type_name(store, id))
        }
        Type::Generic { name, module, .. } => {
            format!("photongen::{}::{}", module.name(), name)
        }
        Type::GenericParameter { name } => name.clone(),
    }
}

/// Ground control C++ field declaration.
pub fn gc_field_repr(store: &TypeStore, id: TypeId, name: &str) -> String {
    format!("{} {}", gc_type_repr(store, id), name)
}

/// `Photon<Mangled>` symbol base of a named or derived type.
pub fn onboard_symbol(store: &TypeStore, id: TypeId) -> String {
    format!("Photon{}", type_name(store, id))
}
