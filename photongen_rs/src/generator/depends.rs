//! Transitive type dependency collection and include path generation.
//!
//! The closure rules: builtins, references, arrays and function types are
//! transparent; named types are collected without descending; dyn arrays are
//! collected and their element collected separately; generic instantiations
//! are collected together with their substitution dependencies.

use std::collections::BTreeSet;

use crate::ast::{Accessor, Ast, Component, StatusMsg};
use crate::generator::src_builder::SrcBuilder;
use crate::generator::type_name::type_name;
use crate::types::{Type, TypeId, TypeStore, VariantField};

/// Ordered dependency set; `TypeId` order is store insertion order, which is
/// deterministic for a fixed input set.
pub type Depends = BTreeSet<TypeId>;

pub struct DependsCollector<'a> {
    store: &'a TypeStore,
}

impl<'a> DependsCollector<'a> {
    pub fn new(store: &'a TypeStore) -> Self {
        DependsCollector { store }
    }

    /// Dependencies of a type definition (excluding the type itself).
    pub fn collect_type(&self, root: TypeId, dest: &mut Depends) {
        match self.store.get(root) {
            Type::Struct { fields, .. } => {
                for field in fields {
                    self.walk(field.ty, dest);
                }
            }
            Type::Variant { fields, .. } => {
                for field in fields {
                    match field {
                        VariantField::Constant { .. } => {}
                        VariantField::Tuple { types, .. } => {
                            for ty in types {
                                self.walk(*ty, dest);
                            }
                        }
                        VariantField::Struct { fields, .. } => {
                            for f in fields {
                                self.walk(f.ty, dest);
                            }
                        }
                    }
                }
            }
            Type::Enum { .. } | Type::Builtin(_) | Type::GenericParameter { .. } => {}
            Type::Alias { referent, .. } => self.walk(*referent, dest),
            Type::Imported { link, .. } => {
                if let Some(link) = link {
                    self.walk(*link, dest);
                }
            }
            Type::DynArray { element, .. } => self.walk(*element, dest),
            Type::Array { element, .. } => self.walk(*element, dest),
            Type::Reference { pointee, .. } => self.walk(*pointee, dest),
            Type::Function(func) => {
                for arg in &func.args {
                    self.walk(arg.ty, dest);
                }
                if let Some(ret) = func.ret {
                    self.walk(ret, dest);
                }
            }
            Type::Generic { body, .. } => self.collect_type(*body, dest),
            Type::GenericInstantiation {
                instantiated,
                substitutions,
                ..
            } => {
                self.collect_type(*instantiated, dest);
                for sub in substitutions {
                    self.walk(*sub, dest);
                }
            }
        }
    }

    /// Closure over a component: parameter types, command argument and return
    /// types, status terminal and container types.
    pub fn collect_component(&self, comp: &Component, dest: &mut Depends) {
        self.collect_params(comp, dest);
        self.collect_cmds(comp, dest);
        for msg in &comp.statuses {
            self.collect_status(msg, dest);
        }
        for event in &comp.events {
            for field in &event.fields {
                self.walk(field.ty, dest);
            }
        }
    }

    pub fn collect_params(&self, comp: &Component, dest: &mut Depends) {
        for param in &comp.params {
            self.walk(param.ty, dest);
        }
    }

    pub fn collect_cmds(&self, comp: &Component, dest: &mut Depends) {
        for cmd in &comp.cmds {
            if let Type::Function(func) = self.store.get(cmd.ty) {
                for arg in &func.args {
                    self.walk(arg.ty, dest);
                }
                if let Some(ret) = func.ret {
                    self.walk(ret, dest);
                }
            }
        }
    }

    pub fn collect_status(&self, msg: &StatusMsg, dest: &mut Depends) {
        for part in &msg.parts {
            for acc in &part.accessors {
                match acc {
                    Accessor::Field { field_ty, .. } => {
                        if let Some(ty) = field_ty {
                            self.walk(*ty, dest);
                        }
                    }
                    Accessor::Subscript { container_ty, .. } => {
                        if let Some(ty) = container_ty {
                            self.walk(*ty, dest);
                        }
                    }
                }
            }
        }
    }

    /// Closure over an entire module.
    pub fn collect_ast(&self, ast: &Ast, dest: &mut Depends) {
        for id in ast.named_types() {
            dest.insert(*id);
            self.collect_type(*id, dest);
        }
        for id in &ast.generic_instantiations {
            dest.insert(*id);
            self.collect_type(*id, dest);
        }
        if let Some(comp) = &ast.component {
            self.collect_component(comp, dest);
        }
    }

    fn walk(&self, ty: TypeId, dest: &mut Depends) {
        match self.store.get(ty) {
            Type::Builtin(_) | Type::GenericParameter { .. } => {}
            Type::Reference { pointee, .. } => self.walk(*pointee, dest),
            Type::Array { element, .. } => self.walk(*element, dest),
            Type::Function(func) => {
                for arg in &func.args {
                    self.walk(arg.ty, dest);
                }
                if let Some(ret) = func.ret {
                    self.walk(ret, dest);
                }
            }
            Type::Enum { .. }
            | Type::Struct { .. }
            | Type::Variant { .. }
            | Type::Alias { .. }
            | Type::Generic { .. } => {
                dest.insert(ty);
            }
            Type::Imported { link, .. } => {
                if let Some(link) = link {
                    dest.insert(*link);
                }
            }
            Type::DynArray { element, .. } => {
                dest.insert(ty);
                self.walk(*element, dest);
            }
            Type::GenericInstantiation { substitutions, .. } => {
                dest.insert(ty);
                for sub in substitutions {
                    self.walk(*sub, dest);
                }
            }
        }
    }
}

/// Include path of a collected type, relative to the `photon/` root, or
/// `None` for types that need no include.
pub fn onboard_include_path(store: &TypeStore, ty: TypeId) -> Option<String> {
    match store.get(ty) {
        Type::Enum { name, module, .. }
        | Type::Struct { name, module, .. }
        | Type::Variant { name, module, .. }
        | Type::Alias { name, module, .. } => Some(format!("{}/{}", module.name(), name)),
        Type::Imported { link, .. } => link.and_then(|l| onboard_include_path(store, l)),
        Type::DynArray { .. } => Some(format!("_dynarray_/{}", type_name(store, ty))),
        Type::GenericInstantiation { .. } => {
            Some(format!("_generic_/{}", type_name(store, ty)))
        }
        _ => None,
    }
}

/// Ground control include path (`.hpp` tree), or `None`. Ground control
/// code resolves aliases through to their targets, so alias includes do too.
pub fn gc_include_path(store: &TypeStore, ty: TypeId) -> Option<String> {
    match store.get(ty) {
        Type::Enum { name, module, .. }
        | Type::Struct { name, module, .. }
        | Type::Variant { name, module, .. } => Some(format!("{}/{}", module.name(), name)),
        Type::Alias { referent, .. } => gc_include_path(store, *referent),
        Type::Imported { link, .. } => link.and_then(|l| gc_include_path(store, l)),
        Type::GenericInstantiation { .. } => {
            Some(format!("_generic_/{}", type_name(store, ty)))
        }
        Type::DynArray { element, .. } => gc_include_path(store, *element),
        _ => None,
    }
}

/// Emit sorted, deduplicated onboard `#include` lines for a dependency set.
pub fn gen_onboard_includes(
    store: &TypeStore,
    deps: &Depends,
    ext: &str,
    out: &mut SrcBuilder,
) {
    let mut paths = BTreeSet::new();
    for ty in deps {
        if let Some(path) = onboard_include_path(store, *ty) {
            paths.insert(path);
        }
    }
    for path in paths {
        out.append_include_with_ext(&path, ext);
    }
}

/// Emit sorted, deduplicated ground control `#include` lines.
pub fn gen_gc_includes(store: &TypeStore, deps: &Depends, out: &mut SrcBuilder) {
    let mut paths = BTreeSet::new();
    for ty in deps {
        if let Some(path) = gc_include_path(store, *ty) {
            paths.insert(path);
        }
    }
    for path in paths {
        out.append_include_with_ext(&path, ".hpp");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::package::Package;

    fn link(sources: &[(&str, &str)]) -> Package {
        let mut diag = Diagnostics::new();
        Package::from_sources(
            &mut diag,
            sources
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect(),
        )
        .expect("link failed")
    }

    fn paths_for_type(package: &Package, module: &str, name: &str) -> Vec<String> {
        let ast = package.module_with_name(module).unwrap();
        let id = ast.find_type_with_name(name).unwrap();
        let collector = DependsCollector::new(package.store());
        let mut deps = Depends::new();
        collector.collect_type(id, &mut deps);
        deps.iter()
            .filter_map(|t| onboard_include_path(package.store(), *t))
            .collect()
    }

    #[test]
    fn named_members_are_collected_without_descent() {
        let package = link(&[(
            "m.decode",
            "module m\n\
             struct Leaf { v: u8 }\n\
             struct Mid { leaf: Leaf }\n\
             struct Top { mid: Mid }",
        )]);
        let paths = paths_for_type(&package, "m", "Top");
        // Mid is a direct dependency; Leaf is hidden behind Mid.
        assert_eq!(paths, vec!["m/Mid".to_string()]);
    }

    #[test]
    fn transparent_wrappers_descend() {
        let package = link(&[(
            "m.decode",
            "module m\nstruct Leaf { v: u8 }\nstruct Top { a: [Leaf; 3], b: *const Leaf }",
        )]);
        let paths = paths_for_type(&package, "m", "Top");
        assert_eq!(paths, vec!["m/Leaf".to_string()]);
    }

    #[test]
    fn dyn_arrays_get_their_own_path_plus_element() {
        let package = link(&[(
            "m.decode",
            "module m\nstruct Leaf { v: u8 }\nstruct Top { xs: &[Leaf; 4] }",
        )]);
        let paths = paths_for_type(&package, "m", "Top");
        // Set order follows store insertion: Leaf first, then the dyn array
        // node created while parsing Top.
        assert_eq!(
            paths,
            vec!["m/Leaf".to_string(), "_dynarray_/SliceOfMLeaf".to_string()]
        );
    }

    #[test]
    fn imported_types_resolve_to_their_defining_module() {
        let package = link(&[
            ("a.decode", "module a\nimport b::T\nstruct S { t: T }"),
            ("b.decode", "module b\nstruct T { v: u8 }"),
        ]);
        let paths = paths_for_type(&package, "a", "S");
        assert_eq!(paths, vec!["b/T".to_string()]);
    }

    #[test]
    fn include_closure_is_monotone() {
        let base = link(&[(
            "m.decode",
            "module m\nstruct Leaf { v: u8 }\nstruct Top { leaf: Leaf }",
        )]);
        let with_unused = link(&[(
            "m.decode",
            "module m\nstruct Leaf { v: u8 }\nstruct Unused { x: u32 }\nstruct Top { leaf: Leaf }",
        )]);
        assert_eq!(
            paths_for_type(&base, "m", "Top"),
            paths_for_type(&with_unused, "m", "Top")
        );
    }

    #[test]
    fn component_closure_includes_status_terminals_and_cmd_types() {
        let package = link(&[(
            "m.decode",
            "module m\n\
             struct Pos { x: f64 }\n\
             enum Mode { Idle = 0 }\n\
             component {\n\
                 parameters { pos: Pos }\n\
                 commands { fn setMode(m: Mode) }\n\
                 statuses { [0, 0, true]: pos.x }\n\
             }",
        )]);
        let comp = package.components().next().unwrap();
        let collector = DependsCollector::new(package.store());
        let mut deps = Depends::new();
        collector.collect_component(comp, &mut deps);
        let paths: Vec<String> = deps
            .iter()
            .filter_map(|t| onboard_include_path(package.store(), *t))
            .collect();
        assert_eq!(paths, vec!["m/Pos".to_string(), "m/Mode".to_string()]);
    }

    #[test]
    fn include_lines_are_sorted_and_deduplicated() {
        let package = link(&[(
            "m.decode",
            "module m\nstruct B { v: u8 }\nstruct A { b1: B, b2: B }\nstruct Top { a: A, b: B }",
        )]);
        let ast = package.module_with_name("m").unwrap();
        let id = ast.find_type_with_name("Top").unwrap();
        let collector = DependsCollector::new(package.store());
        let mut deps = Depends::new();
        collector.collect_type(id, &mut deps);
        let mut out = SrcBuilder::new();
        gen_onboard_includes(package.store(), &deps, ".h", &mut out);
        assert_eq!(
            out.view(),
            "#include \"photon/m/A.h\"\n#include \"photon/m/B.h\"\n"
        );
    }
}
