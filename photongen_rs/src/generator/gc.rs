//! Ground control C++ emitters: per-type headers with inline codecs, status
//! message headers, and the runtime interface validator.

use crate::ast::{Accessor, Component, StatusMsg, StatusRegexp, Subscript};
use crate::generator::depends::{Depends, DependsCollector, gen_gc_includes};
use crate::generator::src_builder::{SrcBuilder, first_lower, first_upper};
use crate::generator::type_name::type_name;
use crate::generator::type_repr::gc_type_repr;
use crate::package::Package;
use crate::types::{BuiltinKind, Type, TypeId, TypeStore, VariantField};

fn builtin_rw(kind: BuiltinKind, ptr_width: u64) -> Option<(&'static str, u64)> {
    // (method suffix, encoded width); variable-width kinds return None.
    match kind {
        BuiltinKind::U8 | BuiltinKind::Bool | BuiltinKind::Char => Some(("Uint8", 1)),
        BuiltinKind::I8 => Some(("Int8", 1)),
        BuiltinKind::U16 => Some(("Uint16Le", 2)),
        BuiltinKind::I16 => Some(("Int16Le", 2)),
        BuiltinKind::U32 => Some(("Uint32Le", 4)),
        BuiltinKind::I32 => Some(("Int32Le", 4)),
        BuiltinKind::U64 => Some(("Uint64Le", 8)),
        BuiltinKind::I64 => Some(("Int64Le", 8)),
        BuiltinKind::F32 => Some(("Float32Le", 4)),
        BuiltinKind::F64 => Some(("Float64Le", 8)),
        BuiltinKind::USize | BuiltinKind::ISize => {
            if ptr_width == 8 {
                Some(("Uint64Le", 8))
            } else {
                Some(("Uint32Le", 4))
            }
        }
        _ => None,
    }
}

/// Emit one inline read or write statement sequence for `expr` of type `ty`.
fn gc_inline_codec(
    store: &TypeStore,
    ty: TypeId,
    expr: &str,
    indent: usize,
    ptr_width: u64,
    ser: bool,
    out: &mut SrcBuilder,
) {
    let resolved = store.resolve_final(ty).unwrap_or(ty);
    match store.get(resolved) {
        Type::Builtin(kind) => match builtin_rw(*kind, ptr_width) {
            Some((suffix, width)) => {
                out.append_indent(indent);
                if ser {
                    out.append(format!(
                        "if (dest->writableSize() < {width}) {{\n"
                    ));
                    out.append_indent(indent + 1);
                    out.append("state->setError(\"Not enough space to serialize\");\n");
                    out.append_indent(indent + 1);
                    out.append("return false;\n");
                    out.append_indent(indent);
                    out.append("}\n");
                    out.append_indent(indent);
                    out.append(format!("dest->write{suffix}({expr});\n"));
                } else {
                    out.append(format!(
                        "if (src->readableSize() < {width}) {{\n"
                    ));
                    out.append_indent(indent + 1);
                    out.append("state->setError(\"Not enough data to deserialize\");\n");
                    out.append_indent(indent + 1);
                    out.append("return false;\n");
                    out.append_indent(indent);
                    out.append("}\n");
                    out.append_indent(indent);
                    out.append(format!("{expr} = src->read{suffix}();\n"));
                }
            }
            None => {
                // varuint / varint
                let var = match kind {
                    BuiltinKind::Varuint => "VarUint",
                    _ => "VarInt",
                };
                out.append_indent(indent);
                if ser {
                    out.append(format!("if (!dest->write{var}({expr})) {{\n"));
                } else {
                    out.append(format!("if (!src->read{var}(&{expr})) {{\n"));
                }
                out.append_indent(indent + 1);
                out.append("state->setError(\"Failed to read varint\");\n");
                out.append_indent(indent + 1);
                out.append("return false;\n");
                out.append_indent(indent);
                out.append("}\n");
            }
        },
        Type::Enum { name, module, .. }
        | Type::Struct { name, module, .. }
        | Type::Variant { name, module, .. } => {
            let op = if ser { "serialize" } else { "deserialize" };
            let ref_op = if ser { "" } else { "&" };
            out.append_indent(indent);
            out.append(format!(
                "if (!photongen::{}::{op}{}({ref_op}{expr}, {}, state)) {{\n",
                module.name(),
                first_upper(name),
                if ser { "dest" } else { "src" }
            ));
            out.append_indent(indent + 1);
            out.append("return false;\n");
            out.append_indent(indent);
            out.append("}\n");
        }
        Type::Array { len, element } => {
            let var = (b'a' + indent as u8 - 1) as char;
            out.append_indent(indent);
            out.append(format!(
                "for (size_t {var} = 0; {var} < {len}; {var}++) {{\n"
            ));
            gc_inline_codec(
                store,
                *element,
                &format!("{expr}[{var}]"),
                indent + 1,
                ptr_width,
                ser,
                out,
            );
            out.append_indent(indent);
            out.append("}\n");
        }
        Type::DynArray {
            max_size, element, ..
        } => {
            let var = (b'a' + indent as u8 - 1) as char;
            if ser {
                out.append_indent(indent);
                out.append(format!(
                    "if ({expr}.size() > {max_size} || !dest->writeVarUint({expr}.size())) {{\n"
                ));
                out.append_indent(indent + 1);
                out.append("state->setError(\"Failed to serialize dynarray\");\n");
                out.append_indent(indent + 1);
                out.append("return false;\n");
                out.append_indent(indent);
                out.append("}\n");
                out.append_indent(indent);
                out.append(format!(
                    "for (size_t {var} = 0; {var} < {expr}.size(); {var}++) {{\n"
                ));
            } else {
                // `_size` is hoisted once per deserializer function; sibling
                // dyn arrays in one body reuse it.
                out.append_indent(indent);
                out.append(format!(
                    "if (!src->readVarUint(&_size) || _size > {max_size}) {{\n"
                ));
                out.append_indent(indent + 1);
                out.append("state->setError(\"Failed to deserialize dynarray\");\n");
                out.append_indent(indent + 1);
                out.append("return false;\n");
                out.append_indent(indent);
                out.append("}\n");
                out.append_indent(indent);
                out.append(format!("{expr}.resize(_size);\n"));
                out.append_indent(indent);
                out.append(format!(
                    "for (size_t {var} = 0; {var} < {expr}.size(); {var}++) {{\n"
                ));
            }
            gc_inline_codec(
                store,
                *element,
                &format!("{expr}[{var}]"),
                indent + 1,
                ptr_width,
                ser,
                out,
            );
            out.append_indent(indent);
            out.append("}\n");
        }
        Type::GenericInstantiation { .. } => {
            let mangled = type_name(store, resolved);
            let op = if ser { "serialize" } else { "deserialize" };
            let ref_op = if ser { "" } else { "&" };
            out.append_indent(indent);
            out.append(format!(
                "if (!photongen::{op}{mangled}({ref_op}{expr}, {}, state)) {{\n",
                if ser { "dest" } else { "src" }
            ));
            out.append_indent(indent + 1);
            out.append("return false;\n");
            out.append_indent(indent);
            out.append("}\n");
        }
        _ => {}
    }
}

/// Whether deserializing `ty` inline (without deferring to a named type's
/// own codec) reads a dyn-array length. Named types and instantiations keep
/// their reads inside their own generated functions.
fn inline_reads_dyn_array(store: &TypeStore, ty: TypeId) -> bool {
    let resolved = store.resolve_final(ty).unwrap_or(ty);
    match store.get(resolved) {
        Type::DynArray { .. } => true,
        Type::Array { element, .. } => inline_reads_dyn_array(store, *element),
        _ => false,
    }
}

/// Emit the shared `_size` local used by every inline dyn-array read in one
/// deserializer body. Declared at most once per function to keep the
/// generated C++ compiling with sibling dyn arrays.
fn append_size_local(out: &mut SrcBuilder) {
    out.append("    uint64_t _size;\n");
}

fn append_gc_prelude(store: &TypeStore, ty: TypeId, out: &mut SrcBuilder) {
    out.append_pragma_once();
    out.eol();
    out.append_sys_include("bmcl/MemReader.h");
    out.append_sys_include("bmcl/MemWriter.h");
    out.append_sys_include("photon/model/CoderState.h");
    out.eol();
    let collector = DependsCollector::new(store);
    let mut deps = Depends::new();
    collector.collect_type(ty, &mut deps);
    gen_gc_includes(store, &deps, out);
    if !deps.is_empty() {
        out.eol();
    }
}

fn begin_namespace(mod_name: &str, out: &mut SrcBuilder) {
    out.append(format!("namespace photongen {{\nnamespace {mod_name} {{\n\n"));
}

fn end_namespace(out: &mut SrcBuilder) {
    out.append("}\n}\n");
}

fn ser_prefix(name: &str, out: &mut SrcBuilder) {
    out.append(format!(
        "inline bool serialize{0}(const {0}& self, bmcl::MemWriter* dest, photon::CoderState* state)\n{{\n",
        first_upper(name)
    ));
}

fn deser_prefix(name: &str, out: &mut SrcBuilder) {
    out.append(format!(
        "inline bool deserialize{0}({0}* self, bmcl::MemReader* src, photon::CoderState* state)\n{{\n",
        first_upper(name)
    ));
}

/// Ground control header for a module-level named type.
pub fn gen_gc_type_header(
    store: &TypeStore,
    ty: TypeId,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    match store.get(ty) {
        Type::Enum { name, module, .. } => {
            let name = name.clone();
            let mod_name = module.name().to_string();
            append_gc_prelude(store, ty, out);
            begin_namespace(&mod_name, out);
            gen_gc_enum(store, ty, &name, out);
            end_namespace(out);
        }
        Type::Struct { name, module, .. } => {
            let name = name.clone();
            let mod_name = module.name().to_string();
            append_gc_prelude(store, ty, out);
            begin_namespace(&mod_name, out);
            gen_gc_struct(store, ty, &name, ptr_width, out);
            end_namespace(out);
        }
        Type::Variant { name, module, .. } => {
            let name = name.clone();
            let mod_name = module.name().to_string();
            append_gc_prelude(store, ty, out);
            begin_namespace(&mod_name, out);
            gen_gc_variant(store, ty, &name, ptr_width, out);
            end_namespace(out);
        }
        _ => {}
    }
}

fn gen_gc_enum(store: &TypeStore, ty: TypeId, name: &str, out: &mut SrcBuilder) {
    let Type::Enum { constants, .. } = store.get(ty) else {
        return;
    };
    out.append(format!("enum class {name} {{\n"));
    for c in constants {
        out.append(format!("    {} = {},\n", c.name, c.value));
    }
    out.append("};\n\n");

    ser_prefix(name, out);
    out.append("    switch(self) {\n");
    for c in constants {
        out.append(format!("    case {name}::{}:\n", c.name));
    }
    out.append("        break;\n    default:\n        state->setError(\"Failed to serialize enum\");\n        return false;\n    }\n");
    out.append("    return dest->writeVarInt((int64_t)self);\n}\n\n");

    deser_prefix(name, out);
    out.append("    int64_t value;\n    if (!src->readVarInt(&value)) {\n        state->setError(\"Failed to read enum\");\n        return false;\n    }\n");
    out.append("    switch(value) {\n");
    for c in constants {
        out.append(format!(
            "    case {}:\n        *self = {name}::{};\n        break;\n",
            c.value, c.name
        ));
    }
    out.append("    default:\n        state->setError(\"Failed to deserialize enum\");\n        return false;\n    }\n    return true;\n}\n\n");
}

fn gen_gc_struct(
    store: &TypeStore,
    ty: TypeId,
    name: &str,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    let Type::Struct { fields, .. } = store.get(ty) else {
        return;
    };
    out.append(format!("struct {name} {{\n"));
    for field in fields {
        out.append(format!(
            "    {};\n",
            crate::generator::type_repr::gc_field_repr(store, field.ty, &field.name)
        ));
    }
    out.append("};\n\n");

    ser_prefix(name, out);
    for field in fields {
        gc_inline_codec(
            store,
            field.ty,
            &format!("self.{}", field.name),
            1,
            ptr_width,
            true,
            out,
        );
    }
    out.append("    return true;\n}\n\n");

    deser_prefix(name, out);
    if fields.iter().any(|f| inline_reads_dyn_array(store, f.ty)) {
        append_size_local(out);
    }
    for field in fields {
        gc_inline_codec(
            store,
            field.ty,
            &format!("self->{}", field.name),
            1,
            ptr_width,
            false,
            out,
        );
    }
    out.append("    return true;\n}\n\n");
}

fn gen_gc_variant(
    store: &TypeStore,
    ty: TypeId,
    name: &str,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    let Type::Variant { fields, .. } = store.get(ty) else {
        return;
    };
    out.append(format!("enum class {name}Type {{\n"));
    for (tag, field) in fields.iter().enumerate() {
        out.append(format!("    {} = {tag},\n", field.name()));
    }
    out.append("};\n\n");

    for field in fields {
        match field {
            VariantField::Constant { .. } => {}
            VariantField::Tuple {
                name: fname, types, ..
            } => {
                out.append(format!("struct {}{name} {{\n", first_upper(fname)));
                for (i, t) in types.iter().enumerate() {
                    out.append(format!(
                        "    {};\n",
                        crate::generator::type_repr::gc_field_repr(
                            store,
                            *t,
                            &format!("_{}", i + 1)
                        )
                    ));
                }
                out.append("};\n\n");
            }
            VariantField::Struct {
                name: fname,
                fields: inner,
                ..
            } => {
                out.append(format!("struct {}{name} {{\n", first_upper(fname)));
                for f in inner {
                    out.append(format!(
                        "    {};\n",
                        crate::generator::type_repr::gc_field_repr(store, f.ty, &f.name)
                    ));
                }
                out.append("};\n\n");
            }
        }
    }

    out.append(format!("struct {name} {{\n    {name}Type type;\n"));
    for field in fields {
        if matches!(field, VariantField::Constant { .. }) {
            continue;
        }
        out.append(format!(
            "    {}{name} {}{name};\n",
            first_upper(field.name()),
            first_lower(field.name())
        ));
    }
    out.append("};\n\n");

    ser_prefix(name, out);
    out.append("    if (!dest->writeVarUint((uint64_t)self.type)) {\n        state->setError(\"Failed to write variant type\");\n        return false;\n    }\n");
    out.append("    switch(self.type) {\n");
    for field in fields {
        out.append(format!("    case {name}Type::{}: {{\n", field.name()));
        gc_variant_branch(store, name, field, ptr_width, true, out);
        out.append("        break;\n    }\n");
    }
    out.append("    default:\n        state->setError(\"Failed to serialize variant\");\n        return false;\n    }\n    return true;\n}\n\n");

    deser_prefix(name, out);
    let branch_reads_dyn_array = fields.iter().any(|f| match f {
        VariantField::Constant { .. } => false,
        VariantField::Tuple { types, .. } => {
            types.iter().any(|t| inline_reads_dyn_array(store, *t))
        }
        VariantField::Struct { fields, .. } => {
            fields.iter().any(|f| inline_reads_dyn_array(store, f.ty))
        }
    });
    if branch_reads_dyn_array {
        append_size_local(out);
    }
    out.append("    uint64_t value;\n    if (!src->readVarUint(&value)) {\n        state->setError(\"Failed to read variant type\");\n        return false;\n    }\n");
    out.append("    switch(value) {\n");
    for (tag, field) in fields.iter().enumerate() {
        out.append(format!(
            "    case {tag}: {{\n        self->type = {name}Type::{};\n",
            field.name()
        ));
        gc_variant_branch(store, name, field, ptr_width, false, out);
        out.append("        break;\n    }\n");
    }
    out.append("    default:\n        state->setError(\"Failed to deserialize variant\");\n        return false;\n    }\n    return true;\n}\n\n");
}

fn gc_variant_branch(
    store: &TypeStore,
    name: &str,
    field: &VariantField,
    ptr_width: u64,
    ser: bool,
    out: &mut SrcBuilder,
) {
    let this = if ser { "self." } else { "self->" };
    let member = format!("{}{name}", first_lower(field.name()));
    match field {
        VariantField::Constant { .. } => {}
        VariantField::Tuple { types, .. } => {
            for (i, t) in types.iter().enumerate() {
                gc_inline_codec(
                    store,
                    *t,
                    &format!("{this}{member}._{}", i + 1),
                    2,
                    ptr_width,
                    ser,
                    out,
                );
            }
        }
        VariantField::Struct { fields, .. } => {
            for f in fields {
                gc_inline_codec(
                    store,
                    f.ty,
                    &format!("{this}{member}.{}", f.name),
                    2,
                    ptr_width,
                    ser,
                    out,
                );
            }
        }
    }
}

/// Ground control header for a generic instantiation: the substituted body
/// under the mangled name in the `photongen` namespace.
pub fn gen_gc_generic_inst_header(
    store: &TypeStore,
    ty: TypeId,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    let Type::GenericInstantiation { instantiated, .. } = store.get(ty) else {
        return;
    };
    let mangled = type_name(store, ty);
    append_gc_prelude(store, ty, out);
    out.append("namespace photongen {\n\n");
    match store.get(*instantiated) {
        Type::Struct { .. } => gen_gc_struct(store, *instantiated, &mangled, ptr_width, out),
        Type::Variant { .. } => gen_gc_variant(store, *instantiated, &mangled, ptr_width, out),
        Type::Enum { .. } => gen_gc_enum(store, *instantiated, &mangled, out),
        _ => {}
    }
    out.append("}\n");
}

// ---- status message headers ---------------------------------------------

/// C++ type of a message part as it appears on the wire.
fn part_field_repr(store: &TypeStore, part: &StatusRegexp) -> Option<String> {
    let terminal = part.ty?;
    let terminal_repr = gc_type_repr(store, terminal);
    for acc in &part.accessors {
        if let Accessor::Subscript { sub, container_ty } = acc {
            let container = (*container_ty)?;
            let is_dyn = matches!(store.get(container), Type::DynArray { .. });
            return Some(match sub {
                Subscript::Index(_) => terminal_repr,
                Subscript::Range {
                    lower: Some(lo),
                    upper: Some(up),
                } if !is_dyn => {
                    format!("std::array<{terminal_repr}, {}>", up - lo)
                }
                _ => format!("std::vector<{terminal_repr}>"),
            });
        }
    }
    Some(terminal_repr)
}

/// `photon/_msgs_/<Comp>Msg<N>.hpp`.
pub fn gen_gc_msg_header(
    store: &TypeStore,
    comp: &Component,
    msg: &StatusMsg,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    out.append_pragma_once();
    out.eol();
    out.append_sys_include("bmcl/MemReader.h");
    out.append_sys_include("photon/model/CoderState.h");
    out.append_sys_include("photon/groundcontrol/NumberedSub.h");
    out.eol();

    let collector = DependsCollector::new(store);
    let mut deps = Depends::new();
    collector.collect_status(msg, &mut deps);
    gen_gc_includes(store, &deps, out);
    out.eol();

    let msg_name = first_upper(&msg.name());
    out.append(format!(
        "namespace photongen {{\nnamespace {} {{\nnamespace statuses {{\n\n",
        comp.name()
    ));
    out.append(format!("struct {msg_name} {{\n"));
    out.append(format!(
        "    static constexpr uint32_t COMP_NUM = {};\n",
        comp.number
    ));
    out.append(format!(
        "    static constexpr uint32_t MSG_NUM = {};\n",
        msg.number
    ));
    out.append(
        "    static constexpr uint64_t MSG_ID = (uint64_t(COMP_NUM) << 32) | uint64_t(MSG_NUM);\n\n",
    );
    out.append(format!(
        "    static photon::NumberedSub sub_()\n    {{\n        return photon::NumberedSub::fromMsg<{msg_name}>();\n    }}\n\n"
    ));
    for part in &msg.parts {
        if let Some(repr) = part_field_repr(store, part) {
            out.append(format!("    {repr} {};\n", part.field_name()));
        }
    }
    out.append("};\n\n}\n}\n}\n\n");

    // Deserializer reading the message body as the status encoder wrote it.
    out.append(format!(
        "inline bool photongenDeserialize(photongen::{}::statuses::{msg_name}* msg, bmcl::MemReader* src, photon::CoderState* state)\n{{\n",
        comp.name()
    ));
    if msg.parts.iter().any(|p| part_reads_dyn_array(store, p)) {
        append_size_local(out);
    }
    for part in &msg.parts {
        gen_gc_msg_part_deser(store, part, ptr_width, out);
    }
    out.append("    return true;\n}\n");
}

/// Whether deserializing one message part reads a dyn-array length, either
/// through a slice range or through the terminal type itself.
fn part_reads_dyn_array(store: &TypeStore, part: &StatusRegexp) -> bool {
    let Some(terminal) = part.ty else {
        return false;
    };
    if inline_reads_dyn_array(store, terminal) {
        return true;
    }
    part.accessors.iter().any(|acc| {
        matches!(
            acc,
            Accessor::Subscript {
                sub: Subscript::Range { .. },
                container_ty: Some(container),
            } if matches!(store.get(*container), Type::DynArray { .. })
        )
    })
}

fn gen_gc_msg_part_deser(
    store: &TypeStore,
    part: &StatusRegexp,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    let Some(terminal) = part.ty else {
        return;
    };
    let field = format!("msg->{}", part.field_name());
    let subscript = part.accessors.iter().find_map(|acc| match acc {
        Accessor::Subscript { sub, container_ty } => Some((*sub, (*container_ty)?)),
        _ => None,
    });
    match subscript {
        None | Some((Subscript::Index(_), _)) => {
            gc_inline_codec(store, terminal, &field, 1, ptr_width, false, out);
        }
        Some((Subscript::Range { lower, upper }, container)) => {
            match store.get(container) {
                Type::Array { len, .. } => {
                    let count = upper.unwrap_or(*len) - lower.unwrap_or(0);
                    out.append(format!(
                        "    for (size_t a = 0; a < {count}; a++) {{\n"
                    ));
                    gc_inline_codec(
                        store,
                        terminal,
                        &format!("{field}[a]"),
                        2,
                        ptr_width,
                        false,
                        out,
                    );
                    out.append("    }\n");
                }
                Type::DynArray { max_size, .. } => {
                    out.append(format!(
                        "    if (!src->readVarUint(&_size) || _size > {max_size}) {{\n        state->setError(\"Failed to deserialize dynarray\");\n        return false;\n    }}\n"
                    ));
                    out.append(format!("    {field}.resize(_size);\n"));
                    // Loop over the resized vector, not `_size`: a nested dyn
                    // array in the element reuses the shared local.
                    out.append(format!("    for (size_t a = 0; a < {field}.size(); a++) {{\n"));
                    gc_inline_codec(
                        store,
                        terminal,
                        &format!("{field}[a]"),
                        2,
                        ptr_width,
                        false,
                        out,
                    );
                    out.append("    }\n");
                }
                _ => {}
            }
        }
    }
}

// ---- interface validator ------------------------------------------------

/// `photon/Interface.hpp`: a runtime validator that rediscovers every
/// generated type in the loaded package and asserts structural equality
/// against the generator-time view.
pub fn gen_gc_interface_header(package: &Package, out: &mut SrcBuilder) {
    let store = package.store();
    out.append_pragma_once();
    out.eol();
    out.append_sys_include("decode/Rc.h");
    out.append_sys_include("decode/groundcontrol/Interface.h");
    out.eol();
    out.append("namespace photongen {\n\n");
    out.append("class Validator {\npublic:\n");
    out.append("    Validator(const decode::Project* project, const decode::Device* device)\n        : _project(project)\n        , _device(device)\n    {\n");

    for ast in package.modules() {
        let mod_name = ast.module_name();
        out.append(format!(
            "        _{mod_name}Ast = decode::findModule(_device.get(), \"{mod_name}\");\n"
        ));
        if ast.component.is_some() {
            out.append(format!(
                "        _{mod_name}Component = decode::getComponent(_{mod_name}Ast.get());\n"
            ));
        }
    }
    out.eol();

    for ast in package.modules() {
        let mod_name = ast.module_name();
        for id in ast.named_types() {
            gen_type_validator(store, mod_name, *id, out);
        }
    }

    out.append("    }\nprivate:\n");
    out.append("    decode::Rc<const decode::Project> _project;\n");
    out.append("    decode::Rc<const decode::Device> _device;\n");
    for ast in package.modules() {
        let mod_name = ast.module_name();
        out.append(format!(
            "    decode::Rc<const decode::Ast> _{mod_name}Ast;\n"
        ));
        if ast.component.is_some() {
            out.append(format!(
                "    decode::Rc<const decode::Component> _{mod_name}Component;\n"
            ));
        }
        for id in ast.named_types() {
            if let Some(name) = store.get(*id).name()
                && matches!(
                    store.get(*id),
                    Type::Enum { .. } | Type::Struct { .. } | Type::Variant { .. }
                )
            {
                out.append(format!(
                    "    decode::Rc<const decode::Type> _{mod_name}{};\n",
                    first_upper(name)
                ));
            }
        }
    }
    out.append("};\n\n}\n");
}

fn gen_type_validator(store: &TypeStore, mod_name: &str, id: TypeId, out: &mut SrcBuilder) {
    match store.get(id) {
        Type::Enum { name, constants, .. } => {
            let member = format!("_{mod_name}{}", first_upper(name));
            out.append(format!(
                "        {member} = decode::findType(_{mod_name}Ast.get(), \"{name}\");\n"
            ));
            for c in constants {
                out.append(format!(
                    "        decode::expectEnumConstant(&{member}, {}, \"{}\");\n",
                    c.value, c.name
                ));
            }
            out.eol();
        }
        Type::Struct { name, fields, .. } => {
            let member = format!("_{mod_name}{}", first_upper(name));
            out.append(format!(
                "        {member} = decode::findType(_{mod_name}Ast.get(), \"{name}\");\n"
            ));
            out.append(format!(
                "        decode::expectFieldNum(&{member}, {});\n",
                fields.len()
            ));
            for (i, field) in fields.iter().enumerate() {
                out.append(format!(
                    "        decode::expectField(&{member}, {i}, \"{}\", \"{}\");\n",
                    field.name,
                    gc_type_repr(store, field.ty)
                ));
            }
            out.eol();
        }
        Type::Variant { name, fields, .. } => {
            let member = format!("_{mod_name}{}", first_upper(name));
            out.append(format!(
                "        {member} = decode::findType(_{mod_name}Ast.get(), \"{name}\");\n"
            ));
            out.append(format!(
                "        decode::expectVariantFieldNum(&{member}, {});\n",
                fields.len()
            ));
            for (i, field) in fields.iter().enumerate() {
                out.append(format!(
                    "        decode::expectVariantField(&{member}, {i}, \"{}\");\n",
                    field.name()
                ));
            }
            out.eol();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;

    fn link_one(src: &str) -> Package {
        let mut diag = Diagnostics::new();
        Package::from_sources(&mut diag, vec![("nav.decode".into(), src.into())])
            .expect("link failed")
    }

    #[test]
    fn gc_struct_header_has_namespace_and_codecs() {
        let package = link_one("module nav\nstruct Pos { lat: f64, n: varuint }");
        let ast = package.module_with_name("nav").unwrap();
        let id = ast.find_type_with_name("Pos").unwrap();
        let mut out = SrcBuilder::new();
        gen_gc_type_header(package.store(), id, 4, &mut out);
        let text = out.view();
        assert!(text.starts_with("#pragma once"));
        assert!(text.contains("namespace photongen {\nnamespace nav {"));
        assert!(text.contains("struct Pos {\n    double lat;\n    uint64_t n;\n};"));
        assert!(text.contains(
            "inline bool serializePos(const Pos& self, bmcl::MemWriter* dest, photon::CoderState* state)"
        ));
        assert!(text.contains("dest->writeFloat64Le(self.lat);"));
        assert!(text.contains("if (!dest->writeVarUint(self.n)) {"));
        assert!(text.contains(
            "inline bool deserializePos(Pos* self, bmcl::MemReader* src, photon::CoderState* state)"
        ));
        assert!(text.contains("self->lat = src->readFloat64Le();"));
    }

    #[test]
    fn gc_enum_header_validates_values() {
        let package = link_one("module nav\nenum Mode { Idle = 0, Active = 3 }");
        let ast = package.module_with_name("nav").unwrap();
        let id = ast.find_type_with_name("Mode").unwrap();
        let mut out = SrcBuilder::new();
        gen_gc_type_header(package.store(), id, 4, &mut out);
        let text = out.view();
        assert!(text.contains("enum class Mode {\n    Idle = 0,\n    Active = 3,\n};"));
        assert!(text.contains("case 3:\n        *self = Mode::Active;"));
        assert!(text.contains("return dest->writeVarInt((int64_t)self);"));
    }

    #[test]
    fn gc_variant_header_round_trips_tags() {
        let package = link_one("module nav\nvariant V { A, B(u8) }");
        let ast = package.module_with_name("nav").unwrap();
        let id = ast.find_type_with_name("V").unwrap();
        let mut out = SrcBuilder::new();
        gen_gc_type_header(package.store(), id, 4, &mut out);
        let text = out.view();
        assert!(text.contains("enum class VType {\n    A = 0,\n    B = 1,\n};"));
        assert!(text.contains("struct BV {\n    uint8_t _1;\n};"));
        assert!(text.contains("VType type;"));
        assert!(text.contains("if (!dest->writeVarUint((uint64_t)self.type)) {"));
        assert!(text.contains("case 1: {\n        self->type = VType::B;"));
    }

    #[test]
    fn msg_header_carries_ids_and_fields() {
        let package = link_one(
            "module nav\n\
             struct Pos { lat: f64 }\n\
             component {\n\
                 parameters { pos: Pos, track: &[u16; 8] }\n\
                 statuses { [0, 0, true]: pos.lat, [1, 0, true]: track[..] }\n\
             }",
        );
        let messages: Vec<_> = package.status_msgs().collect();
        let (comp, msg) = messages[0];
        let mut out = SrcBuilder::new();
        gen_gc_msg_header(package.store(), comp, msg, 4, &mut out);
        let text = out.view();
        assert!(text.contains("namespace photongen {\nnamespace nav {\nnamespace statuses {"));
        assert!(text.contains("struct Msg0 {"));
        assert!(text.contains("static constexpr uint32_t COMP_NUM = 0;"));
        assert!(text.contains("static constexpr uint32_t MSG_NUM = 0;"));
        assert!(text.contains("double pos_lat;"));
        assert!(text.contains("photongenDeserialize(photongen::nav::statuses::Msg0* msg"));
        assert!(text.contains("msg->pos_lat = src->readFloat64Le();"));

        let (comp, msg) = messages[1];
        let mut out = SrcBuilder::new();
        gen_gc_msg_header(package.store(), comp, msg, 4, &mut out);
        let text = out.view();
        assert!(text.contains("std::vector<uint16_t> track;"));
        assert!(text.contains("uint64_t _size;"));
        assert!(text.contains("msg->track.resize(_size);"));
    }

    #[test]
    fn sibling_dyn_arrays_share_one_size_local() {
        let package = link_one(
            "module nav\n\
             struct S { a: &[u8; 4], b: &[u8; 4] }\n\
             variant V { Pair { x: &[u16; 8], y: &[u16; 8] } }",
        );
        let ast = package.module_with_name("nav").unwrap();

        let id = ast.find_type_with_name("S").unwrap();
        let mut out = SrcBuilder::new();
        gen_gc_type_header(package.store(), id, 4, &mut out);
        let text = out.view();
        // One hoisted declaration reused by both members; a second
        // `uint64_t _size;` in the same body would not compile.
        assert_eq!(text.matches("uint64_t _size;").count(), 1);
        assert!(text.contains("if (!src->readVarUint(&_size) || _size > 4) {"));
        assert!(text.contains("self->a.resize(_size);"));
        assert!(text.contains("self->b.resize(_size);"));
        // The serializer never needs the local.
        let deser_at = text.find("deserializeS").unwrap();
        assert!(text.find("uint64_t _size;").unwrap() > deser_at);

        let id = ast.find_type_with_name("V").unwrap();
        let mut out = SrcBuilder::new();
        gen_gc_type_header(package.store(), id, 4, &mut out);
        let text = out.view();
        assert_eq!(text.matches("uint64_t _size;").count(), 1);
        assert!(text.contains("self->pairV.x.resize(_size);"));
        assert!(text.contains("self->pairV.y.resize(_size);"));
    }

    #[test]
    fn msg_with_two_slice_parts_shares_one_size_local() {
        let package = link_one(
            "module nav\n\
             component {\n\
                 parameters { a: &[u16; 8], b: &[u16; 8] }\n\
                 statuses { [0, 0, true]: { a[..], b[..] } }\n\
             }",
        );
        let messages: Vec<_> = package.status_msgs().collect();
        let (comp, msg) = messages[0];
        let mut out = SrcBuilder::new();
        gen_gc_msg_header(package.store(), comp, msg, 4, &mut out);
        let text = out.view();
        assert_eq!(text.matches("uint64_t _size;").count(), 1);
        assert!(text.contains("msg->a.resize(_size);"));
        assert!(text.contains("msg->b.resize(_size);"));
        assert!(text.contains("for (size_t a = 0; a < msg->a.size(); a++) {"));
        assert!(text.contains("for (size_t a = 0; a < msg->b.size(); a++) {"));
    }

    #[test]
    fn interface_validator_checks_every_named_type() {
        let package = link_one(
            "module nav\nstruct Pos { lat: f64 }\ncomponent { parameters { pos: Pos } }",
        );
        let mut out = SrcBuilder::new();
        gen_gc_interface_header(&package, &mut out);
        let text = out.view();
        assert!(text.contains("class Validator {"));
        assert!(text.contains("_navAst = decode::findModule(_device.get(), \"nav\");"));
        assert!(text.contains("_navComponent = decode::getComponent(_navAst.get());"));
        assert!(text.contains("_navPos = decode::findType(_navAst.get(), \"Pos\");"));
        assert!(text.contains("decode::expectFieldNum(&_navPos, 1);"));
        assert!(text.contains("decode::expectField(&_navPos, 0, \"lat\", \"double\");"));
        assert!(text.contains("decode::Rc<const decode::Type> _navPos;"));
    }
}
