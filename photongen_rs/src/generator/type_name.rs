//! Deterministic mangled names for types.
//!
//! Derived types (arrays, references, dyn arrays, generic instantiations)
//! need reproducible identifiers for file names and C symbols. Two types with
//! the same mangled name are structurally equal: array lengths participate in
//! the name so `[u8; 4]` and `[u8; 8]` stay distinct as dyn-array elements.

use crate::generator::src_builder::first_upper;
use crate::types::{ReferenceKind, Type, TypeId, TypeStore};

/// Mangled name of a type, without the `Photon` symbol prefix.
pub fn type_name(store: &TypeStore, id: TypeId) -> String {
    let mut out = String::new();
    append_type_name(store, id, &mut out);
    out
}

fn append_type_name(store: &TypeStore, id: TypeId, out: &mut String) {
    match store.get(id) {
        Type::Builtin(kind) => out.push_str(kind.mangled()),
        Type::Array { len, element } => {
            out.push_str("ArrOf");
            out.push_str(&len.to_string());
            append_type_name(store, *element, out);
        }
        Type::Reference {
            kind,
            is_mutable,
            pointee,
        } => {
            if *is_mutable {
                out.push_str("Mut");
            }
            match kind {
                ReferenceKind::Pointer => out.push_str("PtrTo"),
                ReferenceKind::Reference => out.push_str("RefTo"),
            }
            append_type_name(store, *pointee, out);
        }
        Type::DynArray { element, .. } => {
            out.push_str("SliceOf");
            append_type_name(store, *element, out);
        }
        Type::Function(func) => {
            out.push_str("Fn");
            for arg in &func.args {
                append_type_name(store, arg.ty, out);
            }
            if let Some(ret) = func.ret {
                out.push_str("Rv");
                append_type_name(store, ret, out);
            }
        }
        Type::Enum { name, module, .. }
        | Type::Struct { name, module, .. }
        | Type::Variant { name, module, .. }
        | Type::Alias { name, module, .. }
        | Type::Generic { name, module, .. } => {
            out.push_str(&first_upper(module.name()));
            out.push_str(name);
        }
        Type::Imported { name, module, link, .. } => match link {
            Some(link) => append_type_name(store, *link, out),
            None => {
                out.push_str(&first_upper(module.name()));
                out.push_str(name);
            }
        },
        Type::GenericInstantiation {
            generic_name,
            module,
            substitutions,
            ..
        } => {
            out.push_str(&first_upper(module.name()));
            out.push_str(generic_name);
            for sub in substitutions {
                append_type_name(store, *sub, out);
            }
        }
        Type::GenericParameter { name } => out.push_str(name),
    }
}
