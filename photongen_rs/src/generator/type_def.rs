//! C type definitions: structs, enums, variants, aliases, dyn arrays and
//! component state structs.

use crate::ast::Component;
use crate::generator::src_builder::{SrcBuilder, first_lower, first_upper};
use crate::generator::type_repr::onboard_field_repr;
use crate::types::{Type, TypeId, TypeStore, VariantField};

/// Emit the typedef of a named or derived type. `mod_prefix` is the
/// capitalized module name for module-level types and empty for dyn arrays
/// and generic instantiations (whose `name` is already fully mangled).
pub fn gen_type_def(
    store: &TypeStore,
    out: &mut SrcBuilder,
    mod_prefix: &str,
    name: &str,
    ty: TypeId,
) {
    match store.get(ty) {
        Type::Enum { constants, .. } => {
            out.append("typedef enum {\n");
            for c in constants {
                out.append_indent(1);
                out.append(format!("Photon{mod_prefix}{name}_{}", c.name));
                if c.is_user_set {
                    out.append(format!(" = {}", c.value));
                }
                out.append(",\n");
            }
            out.append(format!("}} Photon{mod_prefix}{name};\n"));
            out.eol();
        }
        Type::Struct { fields, .. } => {
            out.append("typedef struct {\n");
            for field in fields {
                out.append_indent(1);
                out.append(onboard_field_repr(store, field.ty, &field.name));
                out.append(";\n");
            }
            out.append(format!("}} Photon{mod_prefix}{name};\n"));
            out.eol();
        }
        Type::Variant { fields, .. } => gen_variant_def(store, out, mod_prefix, name, fields),
        Type::Alias { referent, .. } => {
            let symbol = format!("Photon{mod_prefix}{name}");
            out.append("typedef ");
            if matches!(store.get(*referent), Type::Function(_)) {
                out.append(onboard_field_repr(store, *referent, &symbol));
            } else {
                out.append(onboard_field_repr(store, *referent, ""));
                out.append_char(' ');
                out.append(&symbol);
            }
            out.append(";\n");
            out.eol();
        }
        Type::DynArray {
            max_size, element, ..
        } => {
            out.append("typedef struct {\n");
            out.append_indent(1);
            out.append(onboard_field_repr(store, *element, ""));
            out.append(format!(" data[{max_size}];\n"));
            out.append_indent(1);
            out.append("size_t size;\n");
            out.append(format!("}} Photon{name};\n"));
            out.eol();
        }
        Type::GenericInstantiation { instantiated, .. } => {
            gen_type_def(store, out, mod_prefix, name, *instantiated);
        }
        _ => {}
    }
}

fn gen_variant_def(
    store: &TypeStore,
    out: &mut SrcBuilder,
    mod_prefix: &str,
    name: &str,
    fields: &[VariantField],
) {
    // Tag enum.
    out.append("typedef enum {\n");
    for field in fields {
        out.append_indent(1);
        out.append(format!("Photon{mod_prefix}{name}Type_{},\n", field.name()));
    }
    out.append(format!("}} Photon{mod_prefix}{name}Type;\n"));
    out.eol();

    // Per-branch payload structs.
    for field in fields {
        match field {
            VariantField::Constant { .. } => {}
            VariantField::Tuple {
                name: fname, types, ..
            } => {
                out.append("typedef struct {\n");
                for (i, ty) in types.iter().enumerate() {
                    out.append_indent(1);
                    out.append(onboard_field_repr(store, *ty, &format!("_{}", i + 1)));
                    out.append(";\n");
                }
                out.append(format!(
                    "}} Photon{mod_prefix}{}{name};\n",
                    first_upper(fname)
                ));
                out.eol();
            }
            VariantField::Struct {
                name: fname,
                fields: inner,
                ..
            } => {
                out.append("typedef struct {\n");
                for f in inner {
                    out.append_indent(1);
                    out.append(onboard_field_repr(store, f.ty, &f.name));
                    out.append(";\n");
                }
                out.append(format!(
                    "}} Photon{mod_prefix}{}{name};\n",
                    first_upper(fname)
                ));
                out.eol();
            }
        }
    }

    // Outer struct: payload union plus tag.
    out.append("typedef struct {\n");
    out.append("    union {\n");
    for field in fields {
        if matches!(field, VariantField::Constant { .. }) {
            continue;
        }
        out.append("        ");
        out.append(format!(
            "Photon{mod_prefix}{}{name} {}{name};\n",
            first_upper(field.name()),
            first_lower(field.name())
        ));
    }
    out.append("    } data;\n");
    out.append_indent(1);
    out.append(format!("Photon{mod_prefix}{name}Type type;\n"));
    out.append(format!("}} Photon{mod_prefix}{name};\n"));
    out.eol();
}

/// Component state struct: one member per parameter.
pub fn gen_component_def(store: &TypeStore, out: &mut SrcBuilder, comp: &Component) {
    if !comp.has_params() {
        return;
    }
    out.append("typedef struct {\n");
    for param in &comp.params {
        out.append_indent(1);
        out.append(onboard_field_repr(store, param.ty, &param.name));
        out.append(";\n");
    }
    out.append(format!(
        "}} Photon{};\n",
        first_upper(comp.module_name())
    ));
    out.eol();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::generator::type_name::type_name;
    use crate::package::Package;

    fn link_one(src: &str) -> Package {
        let mut diag = Diagnostics::new();
        Package::from_sources(&mut diag, vec![("m.decode".into(), src.into())])
            .expect("link failed")
    }

    fn def_text(src: &str, name: &str) -> String {
        let package = link_one(src);
        let ast = package.module_with_name("m").unwrap();
        let id = ast.find_type_with_name(name).unwrap();
        let mut out = SrcBuilder::new();
        gen_type_def(package.store(), &mut out, "M", name, id);
        out.into_inner()
    }

    #[test]
    fn struct_def() {
        let text = def_text("module m\nstruct S { a: u16, b: [u8; 2] }", "S");
        assert_eq!(
            text,
            "typedef struct {\n    uint16_t a;\n    uint8_t b[2];\n} PhotonMS;\n\n"
        );
    }

    #[test]
    fn enum_def_keeps_user_values() {
        let text = def_text("module m\nenum E { A = 1, B = -2 }", "E");
        assert!(text.contains("PhotonME_A = 1,"));
        assert!(text.contains("PhotonME_B = -2,"));
        assert!(text.ends_with("} PhotonME;\n\n"));
    }

    #[test]
    fn variant_def_has_tag_payloads_and_union() {
        let text = def_text("module m\nvariant V { A, B(u8), C { x: u8, y: u8 } }", "V");
        assert!(text.contains("PhotonMVType_A,"));
        assert!(text.contains("} PhotonMVType;"));
        // Tuple payload struct with numbered members.
        assert!(text.contains("uint8_t _1;\n} PhotonMBV;"));
        // Struct payload keeps field names.
        assert!(text.contains("uint8_t x;\n    uint8_t y;\n} PhotonMCV;"));
        // Union carries only non-constant branches.
        assert!(text.contains("PhotonMBV bV;"));
        assert!(text.contains("PhotonMCV cV;"));
        assert!(!text.contains("PhotonMAV"));
        assert!(text.contains("    } data;\n    PhotonMVType type;\n} PhotonMV;"));
    }

    #[test]
    fn alias_def_and_function_alias_def() {
        let text = def_text("module m\ntype Id = u32;", "Id");
        assert_eq!(text, "typedef uint32_t PhotonMId;\n\n");
        let text = def_text("module m\ntype Cb = &Fn(u8) -> bool;", "Cb");
        assert_eq!(text, "typedef bool (*PhotonMCb)(uint8_t);\n\n");
    }

    #[test]
    fn dyn_array_def() {
        let package = link_one("module m\nstruct S { xs: &[u16; 8] }");
        let ast = package.module_with_name("m").unwrap();
        let Type::Struct { fields, .. } =
            package.store().get(ast.find_type_with_name("S").unwrap())
        else {
            panic!()
        };
        let id = fields[0].ty;
        let name = type_name(package.store(), id);
        let mut out = SrcBuilder::new();
        gen_type_def(package.store(), &mut out, "", &name, id);
        assert_eq!(
            out.view(),
            "typedef struct {\n    uint16_t data[8];\n    size_t size;\n} PhotonSliceOfU16;\n\n"
        );
    }

    #[test]
    fn component_def_wraps_params() {
        let package = link_one(
            "module m\ncomponent { parameters { alt: f64, mode: u8 } }",
        );
        let comp = package.components().next().unwrap();
        let mut out = SrcBuilder::new();
        gen_component_def(package.store(), &mut out, comp);
        assert_eq!(
            out.view(),
            "typedef struct {\n    double alt;\n    uint8_t mode;\n} PhotonM;\n\n"
        );
    }
}
