//! Onboard C emitters: type headers and sources, component headers, dyn
//! array and generic instantiation files, function prototypes.

use crate::ast::{Ast, Component, Function, ImplBlock};
use crate::generator::depends::{Depends, DependsCollector, gen_onboard_includes};
use crate::generator::inline::{InlineTypeInspector, inspect_fields};
use crate::generator::src_builder::{InlineSerContext, SrcBuilder, first_lower, first_upper};
use crate::generator::type_name::type_name;
use crate::generator::type_repr::{onboard_field_repr, onboard_symbol, onboard_type_repr};
use crate::types::{SelfArgument, Type, TypeId, TypeStore, VariantField};

/// Composite types pass into user code by const pointer; scalars, enums,
/// references and arrays pass by value.
fn passes_by_pointer(store: &TypeStore, ty: TypeId) -> bool {
    match store.get(ty) {
        Type::DynArray { .. }
        | Type::Struct { .. }
        | Type::Variant { .. }
        | Type::GenericInstantiation { .. } => true,
        Type::Imported { link, .. } => link.is_some_and(|l| passes_by_pointer(store, l)),
        Type::Alias { referent, .. } => passes_by_pointer(store, *referent),
        _ => false,
    }
}

fn is_array(store: &TypeStore, ty: TypeId) -> bool {
    match store.get(ty) {
        Type::Array { .. } => true,
        Type::Imported { link, .. } => link.is_some_and(|l| is_array(store, l)),
        Type::Alias { referent, .. } => is_array(store, *referent),
        _ => false,
    }
}

// ---- function prototypes ----------------------------------------------

pub fn serializer_func_decl(store: &TypeStore, ty: TypeId) -> String {
    let symbol = onboard_symbol(store, ty);
    let is_enum = matches!(
        store.resolve_final(ty).map(|t| store.get(t)),
        Some(Type::Enum { .. })
    );
    let star = if is_enum { "" } else { "*" };
    format!("PhotonError {symbol}_Serialize(const {symbol}{star} self, PhotonWriter* dest)")
}

pub fn deserializer_func_decl(store: &TypeStore, ty: TypeId) -> String {
    let symbol = onboard_symbol(store, ty);
    format!("PhotonError {symbol}_Deserialize({symbol}* self, PhotonReader* src)")
}

/// `PhotonError Photon<Mod>_<Cmd>(args..., rv)` - the user implementation
/// called by the command decoder.
pub fn cmd_func_decl(store: &TypeStore, comp: &Component, cmd: &Function) -> String {
    let Type::Function(func) = store.get(cmd.ty) else {
        unreachable!("commands are function types");
    };
    let mut args = Vec::new();
    for arg in &func.args {
        if passes_by_pointer(store, arg.ty) {
            let base = onboard_type_repr(store, arg.ty);
            args.push(format!("const {base}* {}", arg.name));
        } else {
            args.push(onboard_field_repr(store, arg.ty, &arg.name));
        }
    }
    if let Some(ret) = func.ret {
        if is_array(store, ret) {
            args.push(onboard_field_repr(store, ret, "rv"));
        } else {
            let base = onboard_type_repr(store, ret);
            args.push(format!("{base}* rv"));
        }
    }
    let args = if args.is_empty() {
        "void".to_string()
    } else {
        args.join(", ")
    };
    format!(
        "PhotonError Photon{}_{}({args})",
        first_upper(comp.module_name()),
        first_upper(&cmd.name)
    )
}

fn impl_func_decl(store: &TypeStore, owner_symbol: &str, func: &Function) -> String {
    let Type::Function(ftype) = store.get(func.ty) else {
        unreachable!("impl entries are function types");
    };
    let mut args = Vec::new();
    match ftype.self_arg {
        Some(SelfArgument::Reference) => args.push(format!("const {owner_symbol}* self")),
        Some(SelfArgument::MutReference) => args.push(format!("{owner_symbol}* self")),
        Some(SelfArgument::Value) => args.push(format!("{owner_symbol} self")),
        None => {}
    }
    for arg in &ftype.args {
        args.push(onboard_field_repr(store, arg.ty, &arg.name));
    }
    let ret = match ftype.ret {
        Some(ret) => onboard_type_repr(store, ret),
        None => "void".to_string(),
    };
    let args = if args.is_empty() {
        "void".to_string()
    } else {
        args.join(", ")
    };
    format!(
        "{ret} {owner_symbol}_{}({args})",
        first_upper(&func.name)
    )
}

fn append_common_includes(out: &mut SrcBuilder) {
    out.append_sys_include("stdbool.h");
    out.append_sys_include("stddef.h");
    out.append_sys_include("stdint.h");
    out.eol();
}

fn append_coder_includes(out: &mut SrcBuilder) {
    out.append_onboard_include("core/Error");
    out.append_onboard_include("core/Reader");
    out.append_onboard_include("core/Writer");
    out.eol();
}

// ---- headers ------------------------------------------------------------

/// Header for a module-level named type (`photon/<mod>/<Name>.h`).
pub fn gen_type_header(store: &TypeStore, ast: &Ast, ty: TypeId, out: &mut SrcBuilder) {
    let ty_ref = store.get(ty);
    let name = ty_ref.name().expect("named type").to_string();
    let mod_name = ast.module_name().to_string();

    out.start_include_guard(&mod_name, &name);
    out.append_onboard_include("Config");
    out.eol();

    let collector = DependsCollector::new(store);
    let mut deps = Depends::new();
    collector.collect_type(ty, &mut deps);
    gen_onboard_includes(store, &deps, ".h", out);
    if !deps.is_empty() {
        out.eol();
    }
    append_common_includes(out);

    gen_type_def_for(store, out, &mod_name, &name, ty);

    // Impl block dependencies plus the coder surface.
    let mut impl_deps = Depends::new();
    if let Some(block) = ast.find_impl_block_with_name(&name) {
        for func in &block.functions {
            collector.collect_type(func.ty, &mut impl_deps);
        }
        gen_onboard_includes(store, &impl_deps, ".h", out);
    }
    append_coder_includes(out);

    out.start_cpp_guard();
    if let Some(block) = ast.find_impl_block_with_name(&name) {
        let symbol = onboard_symbol(store, ty);
        for func in &block.functions {
            out.append(&impl_func_decl(store, &symbol, func));
            out.append(";\n");
        }
        out.eol();
    }
    if !matches!(ty_ref, Type::Alias { .. }) {
        out.append(&serializer_func_decl(store, ty));
        out.append(";\n");
        out.append(&deserializer_func_decl(store, ty));
        out.append(";\n\n");
    }
    out.end_cpp_guard();
    out.end_include_guard();
}

fn gen_type_def_for(
    store: &TypeStore,
    out: &mut SrcBuilder,
    mod_name: &str,
    name: &str,
    ty: TypeId,
) {
    crate::generator::type_def::gen_type_def(store, out, &first_upper(mod_name), name, ty);
}

/// Header for a generic instantiation (`photon/_generic_/<Mangled>.h`).
pub fn gen_generic_inst_header(store: &TypeStore, ty: TypeId, out: &mut SrcBuilder) {
    let mangled = type_name(store, ty);
    out.start_include_guard("GENERIC", &mangled);
    out.append_onboard_include("Config");
    out.eol();

    let collector = DependsCollector::new(store);
    let mut deps = Depends::new();
    collector.collect_type(ty, &mut deps);
    gen_onboard_includes(store, &deps, ".h", out);
    if !deps.is_empty() {
        out.eol();
    }
    append_common_includes(out);

    crate::generator::type_def::gen_type_def(store, out, "", &mangled, ty);

    append_coder_includes(out);
    out.start_cpp_guard();
    out.append(&serializer_func_decl(store, ty));
    out.append(";\n");
    out.append(&deserializer_func_decl(store, ty));
    out.append(";\n\n");
    out.end_cpp_guard();
    out.end_include_guard();
}

/// Header for a dyn array (`photon/_dynarray_/<Mangled>.h`).
pub fn gen_dyn_array_header(store: &TypeStore, ty: TypeId, out: &mut SrcBuilder) {
    let mangled = type_name(store, ty);
    out.start_include_guard("SLICE", &mangled);
    out.append_onboard_include("Config");
    out.eol();

    let collector = DependsCollector::new(store);
    let mut deps = Depends::new();
    collector.collect_type(ty, &mut deps);
    gen_onboard_includes(store, &deps, ".h", out);
    if !deps.is_empty() {
        out.eol();
    }
    append_common_includes(out);

    crate::generator::type_def::gen_type_def(store, out, "", &mangled, ty);

    append_coder_includes(out);
    out.start_cpp_guard();
    out.append(&serializer_func_decl(store, ty));
    out.append(";\n");
    out.append(&deserializer_func_decl(store, ty));
    out.append(";\n\n");
    out.end_cpp_guard();
    out.end_include_guard();
}

/// `photon/<mod>/<Mod>.Component.h`.
pub fn gen_component_header(
    store: &TypeStore,
    ast: &Ast,
    comp: &Component,
    out: &mut SrcBuilder,
) {
    let mod_name = comp.module_name().to_string();
    out.start_include_guard("COMPONENT", &mod_name);
    out.append_onboard_include("Config");
    out.eol();

    out.append(format!(
        "#define PHOTON_{}_COMPONENT_ID {}\n",
        mod_name.to_ascii_uppercase(),
        comp.number
    ));
    for msg in &comp.statuses {
        out.append(format!(
            "#define PHOTON_{}_STATUS_{}_ID {}\n",
            mod_name.to_ascii_uppercase(),
            msg.name().to_ascii_uppercase(),
            msg.number
        ));
    }
    for (num, cmd) in comp.cmds.iter().enumerate() {
        out.append(format!(
            "#define PHOTON_{}_CMD_{}_ID {}\n",
            mod_name.to_ascii_uppercase(),
            cmd.name.to_ascii_uppercase(),
            num
        ));
    }
    for event in &comp.events {
        out.append(format!(
            "#define PHOTON_{}_EVENT_{}_ID {}\n",
            mod_name.to_ascii_uppercase(),
            event.name.to_ascii_uppercase(),
            event.number
        ));
    }
    out.eol();

    let collector = DependsCollector::new(store);
    let mut deps = Depends::new();
    collector.collect_component(comp, &mut deps);
    gen_onboard_includes(store, &deps, ".h", out);
    if !deps.is_empty() {
        out.eol();
    }
    append_common_includes(out);

    crate::generator::type_def::gen_component_def(store, out, comp);
    if comp.has_params() {
        out.append(format!(
            "extern Photon{0} _photon{0};\n\n",
            first_upper(&mod_name)
        ));
    }

    let mut impl_deps = Depends::new();
    collector.collect_cmds(comp, &mut impl_deps);
    if let Some(block) = &comp.impl_block {
        for func in &block.functions {
            collector.collect_type(func.ty, &mut impl_deps);
        }
    }
    gen_onboard_includes(store, &impl_deps, ".h", out);
    append_coder_includes(out);

    out.start_cpp_guard();
    if let Some(block) = &comp.impl_block {
        gen_component_impl_prototypes(store, &mod_name, block, out);
    }
    for cmd in &comp.cmds {
        out.append(&cmd_func_decl(store, comp, cmd));
        out.append(";\n");
    }
    if comp.has_cmds() {
        out.eol();
    }
    for event in &comp.events {
        out.append(&event_func_decl(store, comp, event));
        out.append(";\n");
    }
    if comp.has_events() {
        out.eol();
    }
    out.end_cpp_guard();
    out.end_include_guard();
}

/// `PhotonError Photon<Mod>_QueueEvent_<Name>(fields...)` - implemented by
/// the telemetry runtime, called by user code to raise an event.
pub fn event_func_decl(
    store: &TypeStore,
    comp: &Component,
    event: &crate::ast::EventMsg,
) -> String {
    let mut args = Vec::new();
    for field in &event.fields {
        if passes_by_pointer(store, field.ty) {
            let base = onboard_type_repr(store, field.ty);
            args.push(format!("const {base}* {}", field.name));
        } else {
            args.push(onboard_field_repr(store, field.ty, &field.name));
        }
    }
    let args = if args.is_empty() {
        "void".to_string()
    } else {
        args.join(", ")
    };
    format!(
        "PhotonError Photon{}_QueueEvent_{}({args})",
        first_upper(comp.module_name()),
        first_upper(&event.name)
    )
}

fn gen_component_impl_prototypes(
    store: &TypeStore,
    mod_name: &str,
    block: &ImplBlock,
    out: &mut SrcBuilder,
) {
    for func in &block.functions {
        let Type::Function(ftype) = store.get(func.ty) else {
            continue;
        };
        let ret = match ftype.ret {
            Some(ret) => onboard_type_repr(store, ret),
            None => "void".to_string(),
        };
        let mut args: Vec<String> = ftype
            .args
            .iter()
            .map(|a| onboard_field_repr(store, a.ty, &a.name))
            .collect();
        if args.is_empty() {
            args.push("void".to_string());
        }
        out.append(format!(
            "{ret} Photon{}_{}({});\n",
            first_upper(mod_name),
            first_upper(&func.name),
            args.join(", ")
        ));
    }
    out.eol();
}

// ---- sources ------------------------------------------------------------

/// `.gen.c` body for a module-level named type.
pub fn gen_type_source(
    store: &TypeStore,
    ty: TypeId,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    // Aliases and import stubs share the codecs of their targets.
    if matches!(store.get(ty), Type::Alias { .. } | Type::Imported { .. }) {
        return;
    }
    let Some(module) = store.get(ty).module().cloned() else {
        return;
    };
    let name = store.get(ty).name().expect("named type").to_string();
    let path = format!("{}/{}", module.name(), name);
    gen_source_with_include(store, ty, ty, &path, ptr_width, out);
}

/// `.gen.c` body for a generic instantiation.
pub fn gen_generic_inst_source(
    store: &TypeStore,
    ty: TypeId,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    let path = format!("_generic_/{}", type_name(store, ty));
    let Type::GenericInstantiation { instantiated, .. } = store.get(ty) else {
        return;
    };
    gen_source_with_include(store, ty, *instantiated, &path, ptr_width, out);
}

/// `.gen.c` body for a dyn array.
pub fn gen_dyn_array_source(
    store: &TypeStore,
    ty: TypeId,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    let path = format!("_dynarray_/{}", type_name(store, ty));
    gen_source_with_include(store, ty, ty, &path, ptr_width, out);
}

fn gen_source_with_include(
    store: &TypeStore,
    decl_ty: TypeId,
    body_ty: TypeId,
    include_path: &str,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    // Member and case names in the body must match the emitted typedef: the
    // simple name for module types, the full mangled name for
    // instantiations.
    let def_name = match store.get(decl_ty) {
        Type::GenericInstantiation { .. } => type_name(store, decl_ty),
        other => other.name().unwrap_or_default().to_string(),
    };
    let body_ty = store.resolve_final(body_ty).unwrap_or(body_ty);
    match store.get(body_ty) {
        Type::Enum { .. } | Type::Struct { .. } | Type::Variant { .. } | Type::DynArray { .. } => {}
        _ => return,
    }

    out.append_onboard_include(include_path);
    out.append_onboard_include("core/Try");
    out.append_onboard_include("core/Logging");
    out.eol();
    out.append(format!("#define _PHOTON_FNAME \"photon/{include_path}.gen.c\"\n"));
    out.eol();

    out.append(&serializer_func_decl(store, decl_ty));
    out.append("\n{\n");
    gen_serializer_body(store, decl_ty, body_ty, &def_name, ptr_width, true, out);
    out.append("    return PhotonError_Ok;\n}\n");
    out.eol();
    out.append(&deserializer_func_decl(store, decl_ty));
    out.append("\n{\n");
    gen_serializer_body(store, decl_ty, body_ty, &def_name, ptr_width, false, out);
    out.append("    return PhotonError_Ok;\n}\n\n#undef _PHOTON_FNAME\n");
}

fn gen_serializer_body(
    store: &TypeStore,
    decl_ty: TypeId,
    body_ty: TypeId,
    def_name: &str,
    ptr_width: u64,
    ser: bool,
    out: &mut SrcBuilder,
) {
    let symbol = onboard_symbol(store, decl_ty);
    match store.get(body_ty) {
        Type::Enum { constants, .. } => {
            if ser {
                out.append("    switch(self) {\n");
                for c in constants {
                    out.append(format!("    case {symbol}_{}:\n", c.name));
                }
                out.append(
                    "        break;\n    default:\n        PHOTON_CRITICAL(\"Failed to serialize enum\");\n        return PhotonError_InvalidValue;\n    }\n    ",
                );
                out.append_try_msg(
                    "PhotonWriter_WriteVarint(dest, (int64_t)self)",
                    "Failed to write enum",
                );
            } else {
                out.append("    int64_t value;\n");
                out.append(format!("    {symbol} result;\n    "));
                out.append_try_msg(
                    "PhotonReader_ReadVarint(src, &value)",
                    "Failed to read enum",
                );
                out.append("    switch(value) {\n");
                for c in constants {
                    out.append(format!(
                        "    case {}:\n        result = {symbol}_{};\n        break;\n",
                        c.value, c.name
                    ));
                }
                out.append(
                    "    default:\n        PHOTON_WARNING(\"Failed to deserialize enum\");\n        return PhotonError_InvalidValue;\n    }\n    *self = result;\n",
                );
            }
        }
        Type::Struct { fields, .. } => {
            let items: Vec<(String, TypeId)> = fields
                .iter()
                .map(|f| (format!("self->{}", f.name), f.ty))
                .collect();
            let mut inspector = InlineTypeInspector::new(store, ptr_width);
            inspect_fields(
                &mut inspector,
                out,
                store,
                ptr_width,
                &items,
                InlineSerContext::new(),
                ser,
            );
        }
        Type::Variant { fields, .. } => {
            gen_variant_body(store, &symbol, def_name, fields, ptr_width, ser, out);
        }
        Type::DynArray {
            max_size, element, ..
        } => {
            gen_dyn_array_body(store, *max_size, *element, ptr_width, ser, out);
        }
        _ => {}
    }
}

fn gen_variant_body(
    store: &TypeStore,
    symbol: &str,
    simple_name: &str,
    fields: &[VariantField],
    ptr_width: u64,
    ser: bool,
    out: &mut SrcBuilder,
) {
    let mut inspector = InlineTypeInspector::new(store, ptr_width);
    let ctx = InlineSerContext::new().indent();
    if ser {
        out.append("    ");
        out.append_try_msg(
            "PhotonWriter_WriteVaruint(dest, (uint64_t)self->type)",
            "Failed to write variant type",
        );
        out.append("    switch(self->type) {\n");
        for field in fields {
            out.append(format!("    case {symbol}Type_{}: {{\n", field.name()));
            gen_variant_branch(store, &mut inspector, simple_name, field, ctx, ser, out);
            out.append("        break;\n    }\n");
        }
        out.append(
            "    default:\n        PHOTON_CRITICAL(\"Failed to serialize variant\");\n        return PhotonError_InvalidValue;\n    }\n",
        );
    } else {
        out.append("    uint64_t value;\n    ");
        out.append_try_msg(
            "PhotonReader_ReadVaruint(src, &value)",
            "Failed to read variant type",
        );
        out.append("    switch(value) {\n");
        for (tag, field) in fields.iter().enumerate() {
            out.append(format!(
                "    case {tag}: {{\n        self->type = {symbol}Type_{};\n",
                field.name()
            ));
            gen_variant_branch(store, &mut inspector, simple_name, field, ctx, ser, out);
            out.append("        break;\n    }\n");
        }
        out.append(
            "    default:\n        PHOTON_WARNING(\"Failed to deserialize variant\");\n        return PhotonError_InvalidValue;\n    }\n",
        );
    }
}

fn gen_variant_branch(
    store: &TypeStore,
    inspector: &mut InlineTypeInspector<'_>,
    simple_name: &str,
    field: &VariantField,
    ctx: InlineSerContext,
    ser: bool,
    out: &mut SrcBuilder,
) {
    let member = format!("{}{simple_name}", first_lower(field.name()));
    match field {
        VariantField::Constant { .. } => {}
        VariantField::Tuple { types, .. } => {
            for (i, ty) in types.iter().enumerate() {
                let arg = format!("self->data.{member}._{}", i + 1);
                if ser {
                    inspector.gen_serializer(out, *ty, ctx, &arg, true);
                } else {
                    inspector.gen_deserializer(out, *ty, ctx, &arg, true);
                }
            }
        }
        VariantField::Struct { fields, .. } => {
            for f in fields {
                let arg = format!("self->data.{member}.{}", f.name);
                if ser {
                    inspector.gen_serializer(out, f.ty, ctx, &arg, true);
                } else {
                    inspector.gen_deserializer(out, f.ty, ctx, &arg, true);
                }
            }
        }
    }
}

fn gen_dyn_array_body(
    store: &TypeStore,
    max_size: u64,
    element: TypeId,
    ptr_width: u64,
    ser: bool,
    out: &mut SrcBuilder,
) {
    let ctx = InlineSerContext::new();
    let mut inspector = InlineTypeInspector::new(store, ptr_width);
    let fixed = store.fixed_size(element, ptr_width);
    if ser {
        out.append(format!(
            "    if (self->size > {max_size}) {{\n        PHOTON_CRITICAL(\"Failed to serialize dynarray\");\n        return PhotonError_InvalidValue;\n    }}\n    "
        ));
        out.append_try_msg(
            "PhotonWriter_WriteVaruint(dest, self->size)",
            "Failed to write dynarray size",
        );
        if let Some(size) = fixed {
            out.append_writable_size_check(ctx, &format!("self->size * {size}"));
        }
        out.append_loop_header(ctx, "self->size");
        inspector.gen_serializer(out, element, ctx.indent(), "self->data[a]", fixed.is_none());
        out.append("    }\n");
    } else {
        out.append("    uint64_t size;\n    ");
        out.append_try_msg(
            "PhotonReader_ReadVaruint(src, &size)",
            "Failed to read dynarray size",
        );
        out.append(format!(
            "    if (size > {max_size}) {{\n        PHOTON_WARNING(\"Failed to deserialize dynarray\");\n        return PhotonError_InvalidValue;\n    }}\n"
        ));
        if let Some(size) = fixed {
            out.append_readable_size_check(ctx, &format!("size * {size}"));
        }
        out.append_loop_header(ctx, "size");
        inspector.gen_deserializer(out, element, ctx.indent(), "self->data[a]", fixed.is_none());
        out.append("    }\n");
        let is_char = matches!(
            store.resolve_final(element).map(|t| store.get(t)),
            Some(Type::Builtin(crate::types::BuiltinKind::Char))
        );
        if is_char {
            out.append("    self->data[size] = '\\0';\n");
        }
        out.append("    self->size = size;\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::package::Package;

    fn link_one(src: &str) -> Package {
        let mut diag = Diagnostics::new();
        Package::from_sources(&mut diag, vec![("nav.decode".into(), src.into())])
            .expect("link failed")
    }

    #[test]
    fn type_header_has_guard_typedef_and_prototypes() {
        let package = link_one("module nav\nstruct Position { x: f64, y: f64 }");
        let ast = package.module_with_name("nav").unwrap();
        let id = ast.find_type_with_name("Position").unwrap();
        let mut out = SrcBuilder::new();
        gen_type_header(package.store(), ast, id, &mut out);
        let text = out.view();
        assert!(text.starts_with("#ifndef __PHOTON_NAV_POSITION_H__"));
        assert!(text.contains("#include \"photon/Config.h\""));
        assert!(text.contains("#include <stdint.h>"));
        assert!(text.contains("} PhotonNavPosition;"));
        assert!(text.contains(
            "PhotonError PhotonNavPosition_Serialize(const PhotonNavPosition* self, PhotonWriter* dest);"
        ));
        assert!(text.contains(
            "PhotonError PhotonNavPosition_Deserialize(PhotonNavPosition* self, PhotonReader* src);"
        ));
        assert!(text.contains("extern \"C\""));
        assert!(text.ends_with("#endif\n\n"));
    }

    #[test]
    fn impl_block_prototypes_are_emitted() {
        let package = link_one(
            "module nav\nstruct Position { x: f64 }\nimpl Position {\n    fn norm(&self) -> f64\n}",
        );
        let ast = package.module_with_name("nav").unwrap();
        let id = ast.find_type_with_name("Position").unwrap();
        let mut out = SrcBuilder::new();
        gen_type_header(package.store(), ast, id, &mut out);
        assert!(
            out.view()
                .contains("double PhotonNavPosition_Norm(const PhotonNavPosition* self);")
        );
    }

    #[test]
    fn enum_source_round_trips_constants() {
        let package = link_one("module nav\nenum Mode { Idle = 0, Active = 2 }");
        let ast = package.module_with_name("nav").unwrap();
        let id = ast.find_type_with_name("Mode").unwrap();
        let mut out = SrcBuilder::new();
        gen_type_source(package.store(), id, 4, &mut out);
        let text = out.view();
        assert!(text.contains("#include \"photon/nav/Mode.h\""));
        assert!(text.contains("case PhotonNavMode_Active:"));
        assert!(text.contains("PhotonWriter_WriteVarint(dest, (int64_t)self)"));
        assert!(text.contains("case 2:\n        result = PhotonNavMode_Active;"));
        assert!(text.contains("*self = result;"));
        assert!(text.contains("#undef _PHOTON_FNAME"));
    }

    #[test]
    fn struct_source_uses_coalesced_checks() {
        let package = link_one("module nav\nstruct P { a: u16, b: u16, c: varuint }");
        let ast = package.module_with_name("nav").unwrap();
        let id = ast.find_type_with_name("P").unwrap();
        let mut out = SrcBuilder::new();
        gen_type_source(package.store(), id, 4, &mut out);
        let text = out.view();
        assert!(text.contains("PhotonWriter_WritableSize(dest) < 4"));
        assert!(text.contains("PhotonWriter_WriteU16Le(dest, self->a);"));
        assert!(text.contains("PHOTON_TRY(PhotonWriter_WriteVaruint(dest, self->c));"));
    }

    #[test]
    fn variant_source_uses_varuint_tag() {
        let package = link_one("module nav\nvariant V { A, B(u8) }");
        let ast = package.module_with_name("nav").unwrap();
        let id = ast.find_type_with_name("V").unwrap();
        let mut out = SrcBuilder::new();
        gen_type_source(package.store(), id, 4, &mut out);
        let text = out.view();
        assert!(text.contains("PhotonWriter_WriteVaruint(dest, (uint64_t)self->type)"));
        assert!(text.contains("case PhotonNavVType_B: {"));
        assert!(text.contains("self->data.bV._1"));
        assert!(text.contains("case 1: {\n        self->type = PhotonNavVType_B;"));
        assert!(text.contains("PHOTON_WARNING(\"Failed to deserialize variant\")"));
    }

    #[test]
    fn dyn_array_files_enforce_bounds() {
        let package = link_one("module nav\nstruct S { xs: &[u8; 16] }");
        let store = package.store();
        let ast = package.module_with_name("nav").unwrap();
        let Type::Struct { fields, .. } =
            store.get(ast.find_type_with_name("S").unwrap())
        else {
            panic!()
        };
        let dyn_ty = fields[0].ty;
        let mut header = SrcBuilder::new();
        gen_dyn_array_header(store, dyn_ty, &mut header);
        assert!(header.view().contains("} PhotonSliceOfU8;"));
        assert!(
            header.view().contains(
                "PhotonError PhotonSliceOfU8_Serialize(const PhotonSliceOfU8* self, PhotonWriter* dest);"
            )
        );
        let mut source = SrcBuilder::new();
        gen_dyn_array_source(store, dyn_ty, 4, &mut source);
        let text = source.view();
        assert!(text.contains("#include \"photon/_dynarray_/SliceOfU8.h\""));
        assert!(text.contains("if (self->size > 16) {"));
        assert!(text.contains("if (size > 16) {"));
        assert!(text.contains("self->size = size;"));
    }

    #[test]
    fn component_header_defines_ids_and_prototypes() {
        let package = link_one(
            "module nav\n\
             struct Pos { x: f64 }\n\
             component {\n\
                 parameters { pos: Pos }\n\
                 commands { fn setPos(p: Pos) -> u8 }\n\
                 statuses { [3, 0, true]: pos.x }\n\
             }",
        );
        let ast = package.module_with_name("nav").unwrap();
        let comp = ast.component.as_ref().unwrap();
        let mut out = SrcBuilder::new();
        gen_component_header(package.store(), ast, comp, &mut out);
        let text = out.view();
        assert!(text.contains("#define PHOTON_NAV_COMPONENT_ID 0"));
        assert!(text.contains("#define PHOTON_NAV_STATUS_MSG3_ID 3"));
        assert!(text.contains("#define PHOTON_NAV_CMD_SETPOS_ID 0"));
        assert!(text.contains("} PhotonNav;"));
        assert!(text.contains("extern PhotonNav _photonNav;"));
        assert!(text.contains(
            "PhotonError PhotonNav_SetPos(const PhotonNavPos* p, uint8_t* rv);"
        ));
    }

    #[test]
    fn component_events_get_ids_and_queue_prototypes() {
        let package = link_one(
            "module nav\n\
             struct Pos { x: f64 }\n\
             component {\n\
                 parameters { pos: Pos }\n\
                 events { [0, true]: started(), [1, true]: moved(to: Pos, dt: f32) }\n\
             }",
        );
        let ast = package.module_with_name("nav").unwrap();
        let comp = ast.component.as_ref().unwrap();
        let mut out = SrcBuilder::new();
        gen_component_header(package.store(), ast, comp, &mut out);
        let text = out.view();
        assert!(text.contains("#define PHOTON_NAV_EVENT_STARTED_ID 0"));
        assert!(text.contains("#define PHOTON_NAV_EVENT_MOVED_ID 1"));
        assert!(text.contains("PhotonError PhotonNav_QueueEvent_Started(void);"));
        assert!(text.contains(
            "PhotonError PhotonNav_QueueEvent_Moved(const PhotonNavPos* to, float dt);"
        ));
    }

    #[test]
    fn generic_instantiation_files_use_mangled_names() {
        let package = link_one(
            "module nav\nstruct Pair<A, B> { a: A, b: B }\nstruct H { p: Pair<u8, u16> }",
        );
        let ast = package.module_with_name("nav").unwrap();
        let inst = ast.generic_instantiations[0];
        let mut header = SrcBuilder::new();
        gen_generic_inst_header(package.store(), inst, &mut header);
        assert!(header.view().contains("} PhotonNavPairU8U16;"));
        let mut source = SrcBuilder::new();
        gen_generic_inst_source(package.store(), inst, 4, &mut source);
        assert!(
            source
                .view()
                .contains("#include \"photon/_generic_/NavPairU8U16.h\"")
        );
        assert!(source.view().contains(
            "PhotonError PhotonNavPairU8U16_Serialize(const PhotonNavPairU8U16* self, PhotonWriter* dest)"
        ));
    }
}
