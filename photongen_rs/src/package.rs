//! Package linking: combining per-file ASTs, resolving imports and binding
//! status accessor paths.
//!
//! A [`Package`] owns the shared [`TypeStore`] and a name-ordered module map.
//! Linking runs three phases per module, in order: component registration,
//! import resolution, status path resolution. The linker reports every
//! problem it finds and returns a single aggregate failure; on success the
//! package is frozen for generation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::ast::{Accessor, Ast, Component, StatusMsg, Subscript};
use crate::diag::{Diagnostics, FileInfo};
use crate::parser::parse_file;
use crate::types::{Type, TypeId, TypeStore};
use crate::wire;

/// Module files end with this suffix.
pub const DECODE_SUFFIX: &str = ".decode";

#[derive(Debug)]
pub struct Package {
    store: TypeStore,
    /// Module name -> AST, name-ordered for reproducible output.
    modules: BTreeMap<String, Ast>,
    /// Module names of registered components, indexed by component number.
    component_modules: Vec<String>,
    /// Flat (component module, status index) list in registration order.
    status_msgs: Vec<(String, usize)>,
}

impl Package {
    /// Parse and link the given module files.
    pub fn read_from_files<P: AsRef<Path>>(
        diag: &mut Diagnostics,
        files: &[P],
    ) -> Option<Package> {
        let mut sources = Vec::new();
        for path in files {
            let path = path.as_ref();
            let contents = match std::fs::read_to_string(path) {
                Ok(contents) => contents,
                Err(err) => {
                    let finfo = FileInfo::new(path.display().to_string(), "");
                    diag.error(&finfo, None, format!("failed to read file: {err}"));
                    return None;
                }
            };
            sources.push((path.display().to_string(), contents));
        }
        Package::from_sources(diag, sources)
    }

    /// Parse and link every `.decode` file found under `dir`.
    pub fn read_from_dir(diag: &mut Diagnostics, dir: &Path) -> Option<Package> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(DECODE_SUFFIX))
            })
            .collect();
        files.sort();
        Package::read_from_files(diag, &files)
    }

    /// Parse and link in-memory sources: (file name, contents) pairs.
    pub fn from_sources(
        diag: &mut Diagnostics,
        sources: Vec<(String, String)>,
    ) -> Option<Package> {
        let mut store = TypeStore::new();
        let mut modules = BTreeMap::new();
        for (name, contents) in sources {
            let finfo = FileInfo::new(name, contents);
            let ast = parse_file(&finfo, &mut store, diag)?;
            let mod_name = ast.module_name().to_string();
            if modules.contains_key(&mod_name) {
                diag.error(&finfo, None, format!("duplicate module {mod_name}"));
                return None;
            }
            modules.insert(mod_name, ast);
        }
        let mut package = Package {
            store,
            modules,
            component_modules: Vec::new(),
            status_msgs: Vec::new(),
        };
        if package.resolve_all(diag) {
            Some(package)
        } else {
            None
        }
    }

    pub fn store(&self) -> &TypeStore {
        &self.store
    }

    pub fn modules(&self) -> impl Iterator<Item = &Ast> {
        self.modules.values()
    }

    pub fn module_with_name(&self, name: &str) -> Option<&Ast> {
        self.modules.get(name)
    }

    /// Registered components ordered by component number.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.component_modules
            .iter()
            .filter_map(|m| self.modules[m].component.as_ref())
    }

    /// All (component, status message) pairs in registration order.
    pub fn status_msgs(&self) -> impl Iterator<Item = (&Component, &StatusMsg)> {
        self.status_msgs.iter().map(|(module, idx)| {
            let comp = self.modules[module].component.as_ref().unwrap();
            (comp, &comp.statuses[*idx])
        })
    }

    /// Serialize every module as (file name, contents) for the package blob.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for ast in self.modules.values() {
            let finfo = ast.module_info().file();
            wire::write_varuint(&mut out, finfo.file_name().len() as u64);
            out.extend_from_slice(finfo.file_name().as_bytes());
            wire::write_varuint(&mut out, finfo.contents().len() as u64);
            out.extend_from_slice(finfo.contents().as_bytes());
        }
        out
    }

    // ---- linking -------------------------------------------------------

    fn resolve_all(&mut self, diag: &mut Diagnostics) -> bool {
        let mut is_ok = true;
        self.map_components();
        let names: Vec<String> = self.modules.keys().cloned().collect();
        for name in &names {
            is_ok &= self.resolve_types(diag, name);
        }
        for name in &names {
            is_ok &= self.check_alias_cycles(diag, name);
            is_ok &= self.resolve_generics(diag, name);
            is_ok &= self.resolve_statuses(diag, name);
        }
        is_ok
    }

    /// Expand instantiations of imported generics, which the parser left
    /// pending until their import links were filled.
    fn resolve_generics(&mut self, diag: &mut Diagnostics, name: &str) -> bool {
        let ast = &self.modules[name];
        let file = Arc::clone(ast.module_info().file());
        let pending: Vec<TypeId> = ast.generic_instantiations.clone();
        let mut is_ok = true;
        for id in pending {
            let Type::GenericInstantiation {
                generic,
                generic_name,
                substitutions,
                instantiated,
                ..
            } = self.store.get(id).clone()
            else {
                continue;
            };
            if instantiated != generic {
                continue;
            }
            let resolved = self.store.resolve_final(generic);
            let Some(Type::Generic {
                parameters, body, ..
            }) = resolved.map(|r| self.store.get(r).clone())
            else {
                is_ok = false;
                diag.error(
                    &file,
                    None,
                    format!("type {generic_name} is not generic"),
                );
                continue;
            };
            if parameters.len() != substitutions.len() {
                is_ok = false;
                diag.error(
                    &file,
                    None,
                    format!(
                        "type {generic_name} expects {} generic parameters, got {}",
                        parameters.len(),
                        substitutions.len()
                    ),
                );
                continue;
            }
            let expanded = self
                .store
                .clone_and_substitute(body, &parameters, &substitutions);
            if let Type::GenericInstantiation { instantiated, .. } = self.store.get_mut(id) {
                *instantiated = expanded;
            }
        }
        is_ok
    }

    fn map_components(&mut self) {
        for (name, ast) in self.modules.iter_mut() {
            if let Some(comp) = ast.component.as_mut() {
                comp.number = self.component_modules.len();
                self.component_modules.push(name.clone());
                for idx in 0..comp.statuses.len() {
                    self.status_msgs.push((name.clone(), idx));
                }
            }
        }
    }

    fn resolve_types(&mut self, diag: &mut Diagnostics, name: &str) -> bool {
        let mut is_ok = true;
        let ast = &self.modules[name];
        let file = Arc::clone(ast.module_info().file());
        // (stub id, imported name, import path) triples to resolve.
        let mut pending: Vec<(TypeId, String, String)> = Vec::new();
        for import in &ast.imports {
            for id in &import.types {
                let tname = self.store.get(*id).name().unwrap_or_default().to_string();
                pending.push((*id, tname, import.path.clone()));
            }
        }
        for (stub, tname, path) in pending {
            let Some(target) = self.modules.get(&path) else {
                is_ok = false;
                diag.error(
                    &file,
                    None,
                    format!("invalid import module in {name}: {path}"),
                );
                continue;
            };
            let Some(found) = target.find_type_with_name(&tname) else {
                is_ok = false;
                diag.error(
                    &file,
                    None,
                    format!("invalid import type in {name}: {tname}"),
                );
                continue;
            };
            if matches!(self.store.get(found), Type::Imported { .. }) {
                is_ok = false;
                diag.error(
                    &file,
                    None,
                    format!("kind mismatch or cyclic import in {name}: {tname}"),
                );
            }
            if let Type::Imported { link, .. } = self.store.get_mut(stub) {
                *link = Some(found);
            }
        }
        is_ok
    }

    fn check_alias_cycles(&mut self, diag: &mut Diagnostics, name: &str) -> bool {
        let ast = &self.modules[name];
        let file = Arc::clone(ast.module_info().file());
        let mut is_ok = true;
        for id in ast.named_types() {
            if self.store.resolve_final(*id).is_none() {
                is_ok = false;
                let tname = self.store.get(*id).name().unwrap_or_default();
                diag.error(
                    &file,
                    None,
                    format!("cyclic type alias in {name}: {tname}"),
                );
            }
        }
        is_ok
    }

    fn resolve_statuses(&mut self, diag: &mut Diagnostics, name: &str) -> bool {
        let Package { store, modules, .. } = self;
        let ast = modules.get_mut(name).unwrap();
        let file = Arc::clone(ast.module_info().file());
        let Some(comp) = ast.component.as_mut() else {
            return true;
        };
        if !comp.has_statuses() {
            return true;
        }
        if !comp.has_params() {
            diag.error(
                &file,
                None,
                format!("component {name} has statuses but no parameters"),
            );
            return false;
        }

        let root_fields: Vec<(String, TypeId)> = comp
            .params
            .iter()
            .map(|f| (f.name.clone(), f.ty))
            .collect();
        let mut is_ok = true;
        for msg in &mut comp.statuses {
            for re in &mut msg.parts {
                if !re.has_accessors() {
                    continue;
                }
                is_ok &= resolve_regexp(store, diag, &file, &root_fields, re);
            }
        }
        is_ok
    }
}

/// Bind one accessor path, walking the component parameters left to right.
fn resolve_regexp(
    store: &TypeStore,
    diag: &mut Diagnostics,
    file: &Arc<FileInfo>,
    root_fields: &[(String, TypeId)],
    re: &mut crate::ast::StatusRegexp,
) -> bool {
    let mut fields: Vec<(String, TypeId)> = root_fields.to_vec();
    let mut last_type: Option<TypeId> = None;

    if !matches!(re.accessors.first(), Some(Accessor::Field { .. })) {
        diag.error(file, None, "first accessor must be a field");
        return false;
    }
    for acc in &mut re.accessors {
        match acc {
            Accessor::Field { name, field_ty } => {
                if let Some(prev) = last_type {
                    let Some(resolved) = store.resolve_final(prev) else {
                        diag.error(file, None, "unresolved type in status path");
                        return false;
                    };
                    match store.get(resolved) {
                        Type::Struct {
                            fields: inner_fields,
                            ..
                        } => {
                            fields = inner_fields
                                .iter()
                                .map(|f| (f.name.clone(), f.ty))
                                .collect();
                        }
                        _ => {
                            diag.error(
                                file,
                                None,
                                "field accessor can only access a struct",
                            );
                            return false;
                        }
                    }
                }
                let Some((_, ty)) = fields.iter().find(|(n, _)| n == name) else {
                    diag.error(file, None, format!("no field with name {name}"));
                    return false;
                };
                *field_ty = Some(*ty);
                last_type = Some(*ty);
            }
            Accessor::Subscript { sub, container_ty } => {
                let Some(prev) = last_type else {
                    diag.error(file, None, "first accessor must be a field");
                    return false;
                };
                let Some(resolved) = store.resolve_final(prev) else {
                    diag.error(file, None, "unresolved type in status path");
                    return false;
                };
                *container_ty = Some(resolved);
                let element = match store.get(resolved) {
                    Type::DynArray { element, .. } => *element,
                    Type::Array { len, element } => {
                        let in_bounds = match sub {
                            Subscript::Index(i) => *i < *len,
                            Subscript::Range { lower, upper } => {
                                lower.unwrap_or(0) <= upper.unwrap_or(*len)
                                    && upper.unwrap_or(*len) <= *len
                            }
                        };
                        if !in_bounds {
                            diag.error(
                                file,
                                None,
                                format!("subscript out of bounds for array of length {len}"),
                            );
                            return false;
                        }
                        *element
                    }
                    _ => {
                        diag.error(
                            file,
                            None,
                            "subscript accessor can only access an array or dyn array",
                        );
                        return false;
                    }
                };
                last_type = Some(element);
            }
        }
    }
    re.ty = last_type;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BuiltinKind;

    fn link(sources: &[(&str, &str)]) -> (Package, Diagnostics) {
        let mut diag = Diagnostics::new();
        let package = Package::from_sources(
            &mut diag,
            sources
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect(),
        );
        match package {
            Some(p) => (p, diag),
            None => {
                for r in diag.reports() {
                    eprintln!("{}", r.render(false));
                }
                panic!("link failed");
            }
        }
    }

    fn link_err(sources: &[(&str, &str)]) -> Diagnostics {
        let mut diag = Diagnostics::new();
        let package = Package::from_sources(
            &mut diag,
            sources
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect(),
        );
        assert!(package.is_none());
        assert!(diag.has_errors());
        diag
    }

    #[test]
    fn resolves_cross_module_imports() {
        let (package, _) = link(&[
            ("a.decode", "module a\nimport b::T\nstruct S { t: T }"),
            ("b.decode", "module b\nstruct T { v: u8 }"),
        ]);
        let a = package.module_with_name("a").unwrap();
        let stub = a.find_type_with_name("T").unwrap();
        let store = package.store();
        let Type::Imported { link, .. } = store.get(stub) else {
            panic!("expected imported stub");
        };
        let link = link.expect("link filled");
        assert!(matches!(store.get(link), Type::Struct { .. }));
        let resolved = store.resolve_final(stub).unwrap();
        assert_eq!(resolved, link);
    }

    #[test]
    fn missing_import_type_is_a_single_resolution_error() {
        let diag = link_err(&[
            ("a.decode", "module a\nimport b::T\nstruct S { t: T }"),
            ("b.decode", "module b\nstruct U { v: u8 }"),
        ]);
        let errors: Vec<_> = diag
            .reports()
            .iter()
            .filter(|r| r.message.contains("invalid import type"))
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn missing_import_module_is_reported() {
        let diag = link_err(&[("a.decode", "module a\nimport nope::T")]);
        assert!(
            diag.reports()
                .iter()
                .any(|r| r.message.contains("invalid import module"))
        );
    }

    #[test]
    fn import_of_import_is_kind_mismatch_or_cycle() {
        let diag = link_err(&[
            ("a.decode", "module a\nimport b::T"),
            ("b.decode", "module b\nimport a::T"),
        ]);
        assert!(
            diag.reports()
                .iter()
                .any(|r| r.message.contains("kind mismatch or cyclic import"))
        );
    }

    #[test]
    fn cross_module_alias_cycle_is_rejected() {
        let diag = link_err(&[
            ("a.decode", "module a\nimport b::B\ntype A = B;"),
            ("b.decode", "module b\nimport a::A\ntype B = A;"),
        ]);
        assert!(
            diag.reports()
                .iter()
                .any(|r| r.message.contains("cyclic type alias"))
        );
    }

    #[test]
    fn components_are_numbered_in_module_name_order() {
        let (package, _) = link(&[
            ("z.decode", "module z\ncomponent { parameters { a: u8 } }"),
            ("a.decode", "module a\ncomponent { parameters { b: u8 } }"),
        ]);
        let comps: Vec<_> = package.components().collect();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].number, 0);
        assert_eq!(comps[0].module_name(), "a");
        assert_eq!(comps[1].number, 1);
        assert_eq!(comps[1].module_name(), "z");
    }

    #[test]
    fn binds_status_accessor_chain_with_terminal_type() {
        let (package, _) = link(&[(
            "nav.decode",
            "module nav\n\
             struct LatLon { latitude: f64, longitude: f64 }\n\
             struct Position { latLon: LatLon, altitude: f64 }\n\
             component {\n\
                 parameters { pos: Position }\n\
                 statuses { [0, 0, true]: pos.latLon.latitude }\n\
             }\n",
        )]);
        let store = package.store();
        let comp = package.components().next().unwrap();
        let re = &comp.statuses[0].parts[0];
        assert_eq!(re.accessors.len(), 3);
        for acc in &re.accessors {
            match acc {
                Accessor::Field { field_ty, .. } => assert!(field_ty.is_some()),
                Accessor::Subscript { .. } => panic!("unexpected subscript"),
            }
        }
        let terminal = re.ty.expect("terminal type bound");
        assert!(store.equals(terminal, store.builtin(BuiltinKind::F64)));
    }

    #[test]
    fn subscript_binds_container_and_checks_bounds() {
        let (package, _) = link(&[(
            "m.decode",
            "module m\ncomponent { parameters { vals: [u16; 4] } statuses { [0, 0, true]: vals[2] } }",
        )]);
        let comp = package.components().next().unwrap();
        match &comp.statuses[0].parts[0].accessors[1] {
            Accessor::Subscript { container_ty, .. } => assert!(container_ty.is_some()),
            other => panic!("expected subscript, got {other:?}"),
        }

        link_err(&[(
            "m.decode",
            "module m\ncomponent { parameters { vals: [u16; 4] } statuses { [0, 0, true]: vals[4] } }",
        )]);
        link_err(&[(
            "m.decode",
            "module m\ncomponent { parameters { vals: [u16; 4] } statuses { [0, 0, true]: vals[1..9] } }",
        )]);
        link_err(&[(
            "m.decode",
            "module m\ncomponent { parameters { v: u16 } statuses { [0, 0, true]: v[0] } }",
        )]);
        link_err(&[(
            "m.decode",
            "module m\ncomponent { parameters { v: u16 } statuses { [0, 0, true]: missing } }",
        )]);
    }

    #[test]
    fn imported_generics_expand_at_link_time() {
        let (package, _) = link(&[
            (
                "core.decode",
                "module core\nstruct Pair<A, B> { first: A, second: B }",
            ),
            (
                "nav.decode",
                "module nav\nimport core::Pair\nstruct S { p: Pair<u8, u16> }",
            ),
        ]);
        let store = package.store();
        let nav = package.module_with_name("nav").unwrap();
        let inst = nav.generic_instantiations[0];
        let Type::GenericInstantiation {
            generic,
            instantiated,
            ..
        } = store.get(inst)
        else {
            panic!("expected instantiation");
        };
        assert_ne!(generic, instantiated);
        let Type::Struct { fields, .. } = store.get(*instantiated) else {
            panic!("expected expanded struct body");
        };
        assert_eq!(fields.len(), 2);
        assert!(!store.contains_generic_parameter(*instantiated));

        let diag = link_err(&[
            (
                "core.decode",
                "module core\nstruct Pair<A, B> { first: A, second: B }",
            ),
            (
                "nav.decode",
                "module nav\nimport core::Pair\nstruct S { p: Pair<u8> }",
            ),
        ]);
        assert!(
            diag.reports()
                .iter()
                .any(|r| r.message.contains("expects 2 generic parameters"))
        );
    }

    #[test]
    fn statuses_without_parameters_are_rejected() {
        link_err(&[(
            "m.decode",
            "module m\ncomponent { statuses { [0, 0, true]: a } }",
        )]);
    }

    #[test]
    fn duplicate_modules_are_rejected() {
        link_err(&[
            ("a.decode", "module m"),
            ("b.decode", "module m"),
        ]);
    }

    #[test]
    fn encode_is_deterministic_and_length_prefixed() {
        let (package, _) = link(&[
            ("b.decode", "module b\nstruct T { v: u8 }"),
            ("a.decode", "module a\nimport b::T\nstruct S { t: T }"),
        ]);
        let one = package.encode();
        let two = package.encode();
        assert_eq!(one, two);
        assert!(!one.is_empty());
        // First entry is module "a" (name order), file name length prefix.
        assert_eq!(one[0] as usize, "a.decode".len());
    }
}
