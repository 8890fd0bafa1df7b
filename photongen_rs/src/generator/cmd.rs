//! Command decoder and encoder emitters.
//!
//! The decoder turns an incoming (compNum, cmdNum) pair plus serialized
//! arguments into a call of the user command implementation and serializes
//! the return value back. The encoder is the ground-side inverse used by
//! devices that command other devices.

use crate::ast::{Component, Function};
use crate::generator::inline::{InlineTypeInspector, inspect_fields};
use crate::generator::src_builder::{InlineSerContext, SrcBuilder, first_upper};
use crate::generator::type_repr::{onboard_field_repr, onboard_type_repr};
use crate::types::{Type, TypeId, TypeStore};

fn cmd_args<'a>(store: &'a TypeStore, cmd: &Function) -> &'a crate::types::FunctionType {
    match store.get(cmd.ty) {
        Type::Function(func) => func,
        _ => unreachable!("commands are function types"),
    }
}

/// `&` is needed when passing a decoded argument into the user
/// implementation.
fn needs_address_of(store: &TypeStore, ty: TypeId) -> bool {
    match store.get(ty) {
        Type::DynArray { .. }
        | Type::Struct { .. }
        | Type::Variant { .. }
        | Type::GenericInstantiation { .. } => true,
        Type::Imported { link, .. } => link.is_some_and(|l| needs_address_of(store, l)),
        Type::Alias { referent, .. } => needs_address_of(store, *referent),
        _ => false,
    }
}

/// Return values pass by address except arrays, which already decay.
fn rv_needs_address_of(store: &TypeStore, ty: TypeId) -> bool {
    match store.get(ty) {
        Type::Array { .. } => false,
        Type::Imported { link, .. } => link.is_none_or(|l| rv_needs_address_of(store, l)),
        Type::Alias { referent, .. } => rv_needs_address_of(store, *referent),
        _ => true,
    }
}

fn encoder_func_decl(store: &TypeStore, comp: &Component, cmd: &Function) -> String {
    let func = cmd_args(store, cmd);
    let mut args = Vec::new();
    for arg in &func.args {
        if needs_address_of(store, arg.ty) {
            let base = onboard_type_repr(store, arg.ty);
            args.push(format!("const {base}* {}", arg.name));
        } else {
            args.push(onboard_field_repr(store, arg.ty, &arg.name));
        }
    }
    args.push("PhotonWriter* dest".to_string());
    format!(
        "PhotonError Photon{}_SerializeCmd_{}({})",
        first_upper(comp.module_name()),
        first_upper(&cmd.name),
        args.join(", ")
    )
}

// ---- decoder ------------------------------------------------------------

pub fn gen_decoder_header(out: &mut SrcBuilder) {
    out.start_include_guard("PRIVATE", "CMD_DECODER");
    out.append_onboard_include("core/Error");
    out.append_onboard_include("core/Reader");
    out.append_onboard_include("core/Writer");
    out.append_onboard_include("core/Try");
    out.eol();
    out.start_cpp_guard();
    out.append(
        "PhotonError Photon_ExecCmd(uint8_t compNum, uint8_t cmdNum, PhotonReader* src, PhotonWriter* dest);\n",
    );
    out.eol();
    out.end_cpp_guard();
    out.end_include_guard();
}

pub fn gen_decoder_source<'a>(
    store: &TypeStore,
    comps: &[&'a Component],
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    out.append_onboard_include("CmdDecoder.Private");
    out.eol();

    for comp in comps {
        out.append_mod_ifdef(comp.module_name());
        out.append_component_include(comp.module_name(), ".h");
        out.append_endif();
        out.eol();
    }

    for comp in comps {
        if !comp.has_cmds() {
            continue;
        }
        out.append_mod_ifdef(comp.module_name());
        out.eol();
        for (cmd_num, cmd) in comp.cmds.iter().enumerate() {
            gen_decoder_func(store, comp, cmd, comp.number, cmd_num, ptr_width, out);
            out.eol();
        }
        out.append_endif();
        out.eol();
    }

    gen_decoder_main(comps, out);
}

fn gen_decoder_func(
    store: &TypeStore,
    comp: &Component,
    cmd: &Function,
    comp_num: usize,
    cmd_num: usize,
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    let func = cmd_args(store, cmd);
    out.append(format!(
        "static PhotonError decodeCmd{comp_num}_{cmd_num}(PhotonReader* src, PhotonWriter* dest)\n{{\n"
    ));
    if func.args.is_empty() {
        out.append("    (void)src;\n");
    }
    for (i, arg) in func.args.iter().enumerate() {
        out.append_indent(1);
        out.append(onboard_field_repr(store, arg.ty, &format!("_p{i}")));
        out.append(";\n");
    }
    if let Some(ret) = func.ret {
        out.append_indent(1);
        out.append(onboard_field_repr(store, ret, "_rv"));
        out.append(";\n");
    } else {
        out.append("    (void)dest;\n");
    }
    out.eol();

    let ctx = InlineSerContext::new();
    let items: Vec<(String, TypeId)> = func
        .args
        .iter()
        .enumerate()
        .map(|(i, arg)| (format!("_p{i}"), arg.ty))
        .collect();
    let mut inspector = InlineTypeInspector::new(store, ptr_width);
    inspect_fields(&mut inspector, out, store, ptr_width, &items, ctx, false);
    if !items.is_empty() {
        out.eol();
    }

    let mut call_args = Vec::new();
    for (i, arg) in func.args.iter().enumerate() {
        let amp = if needs_address_of(store, arg.ty) { "&" } else { "" };
        call_args.push(format!("{amp}_p{i}"));
    }
    if let Some(ret) = func.ret {
        let amp = if rv_needs_address_of(store, ret) { "&" } else { "" };
        call_args.push(format!("{amp}_rv"));
    }
    out.append_indent(1);
    out.append_try(&format!(
        "Photon{}_{}({})",
        first_upper(comp.module_name()),
        first_upper(&cmd.name),
        call_args.join(", ")
    ));

    if let Some(ret) = func.ret {
        out.eol();
        inspector.gen_serializer(out, ret, ctx, "_rv", true);
    }
    out.append("\n    return PhotonError_Ok;\n}\n");
}

fn gen_decoder_main(comps: &[&Component], out: &mut SrcBuilder) {
    out.append(
        "PhotonError Photon_ExecCmd(uint8_t compNum, uint8_t cmdNum, PhotonReader* src, PhotonWriter* dest)\n{\n",
    );
    out.append("    switch (compNum) {\n");
    for comp in comps {
        if !comp.has_cmds() {
            continue;
        }
        out.append_mod_ifdef(comp.module_name());
        out.append(format!("    case {}: {{\n", comp.number));
        out.append("        switch (cmdNum) {\n");
        for (cmd_num, _) in comp.cmds.iter().enumerate() {
            out.append(format!(
                "        case {cmd_num}:\n            return decodeCmd{}_{cmd_num}(src, dest);\n",
                comp.number
            ));
        }
        out.append("        default:\n            return PhotonError_InvalidCmdId;\n");
        out.append("        }\n    }\n");
        out.append_endif();
    }
    out.append("    }\n    return PhotonError_InvalidComponentId;\n}\n");
}

// ---- encoder ------------------------------------------------------------

pub fn gen_encoder_header(store: &TypeStore, comps: &[&Component], out: &mut SrcBuilder) {
    out.start_include_guard("PRIVATE", "CMD_ENCODER");
    out.append_onboard_include("core/Error");
    out.append_onboard_include("core/Writer");
    out.eol();
    out.start_cpp_guard();
    for comp in comps {
        if !comp.has_cmds() {
            continue;
        }
        out.append_cmd_target_ifdef(comp.module_name());
        for cmd in &comp.cmds {
            out.append(&encoder_func_decl(store, comp, cmd));
            out.append(";\n");
        }
        out.append_endif();
    }
    out.eol();
    out.end_cpp_guard();
    out.end_include_guard();
}

pub fn gen_encoder_source(
    store: &TypeStore,
    comps: &[&Component],
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    out.append_onboard_include("CmdEncoder.Private");
    out.append_onboard_include("core/Try");
    out.append_onboard_include("core/Logging");
    out.eol();
    out.append("#define _PHOTON_FNAME \"photon/CmdEncoder.Private.c\"\n\n");

    for comp in comps {
        if !comp.has_cmds() {
            continue;
        }
        out.append_cmd_target_ifdef(comp.module_name());
        out.eol();
        for (cmd_num, cmd) in comp.cmds.iter().enumerate() {
            out.append(&encoder_func_decl(store, comp, cmd));
            out.append("\n{\n    ");
            out.append_try_msg(
                &format!("PhotonWriter_WriteVaruint(dest, {})", comp.number),
                "Failed to write component number",
            );
            out.append("    ");
            out.append_try_msg(
                &format!("PhotonWriter_WriteVaruint(dest, {cmd_num})"),
                "Failed to write cmd number",
            );

            let func = cmd_args(store, cmd);
            let items: Vec<(String, TypeId)> = func
                .args
                .iter()
                .map(|arg| {
                    let expr = if needs_address_of(store, arg.ty) {
                        format!("*{}", arg.name)
                    } else {
                        arg.name.clone()
                    };
                    (expr, arg.ty)
                })
                .collect();
            let mut inspector = InlineTypeInspector::new(store, ptr_width);
            inspect_fields(
                &mut inspector,
                out,
                store,
                ptr_width,
                &items,
                InlineSerContext::new(),
                true,
            );
            out.append("    return PhotonError_Ok;\n}\n\n");
        }
        out.append_endif();
        out.eol();
    }

    out.append("#undef _PHOTON_FNAME\n");
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

    const COMP: &str = "module nav\n\
        struct Pos { lat: f64, lon: f64 }\n\
        component {\n\
            parameters { pos: Pos }\n\
            commands {\n\
                fn setPos(p: Pos)\n\
                fn getLat() -> f64\n\
                fn scale(k: u8, offset: varint) -> u8\n\
            }\n\
        }";

    #[test]
    fn decoder_dispatches_by_component_and_command() {
        let package = link_one(COMP);
        let comps: Vec<_> = package.components().collect();
        let mut out = SrcBuilder::new();
        gen_decoder_source(package.store(), &comps, 4, &mut out);
        let text = out.view();
        assert!(text.contains("#include \"photon/nav/Nav.Component.h\""));
        assert!(text.contains("static PhotonError decodeCmd0_0(PhotonReader* src, PhotonWriter* dest)"));
        assert!(text.contains("PhotonNavPos _p0;"));
        assert!(text.contains("PHOTON_TRY(PhotonNavPos_Deserialize(&_p0, src));"));
        assert!(text.contains("PHOTON_TRY(PhotonNav_SetPos(&_p0));"));
        // Return values decode into _rv and serialize back.
        assert!(text.contains("double _rv;"));
        assert!(text.contains("PHOTON_TRY(PhotonNav_GetLat(&_rv));"));
        assert!(text.contains("PhotonWriter_WriteF64Le(dest, _rv);"));
        // Main dispatcher.
        assert!(text.contains("switch (compNum) {"));
        assert!(text.contains("case 0: {"));
        assert!(text.contains("return decodeCmd0_2(src, dest);"));
        assert!(text.contains("return PhotonError_InvalidCmdId;"));
        assert!(text.contains("return PhotonError_InvalidComponentId;"));
    }

    #[test]
    fn decoder_mixes_inline_and_non_inline_args() {
        let package = link_one(COMP);
        let comps: Vec<_> = package.components().collect();
        let mut out = SrcBuilder::new();
        gen_decoder_source(package.store(), &comps, 4, &mut out);
        let text = out.view();
        // scale(k: u8, offset: varint): u8 decodes inline, varint through TRY.
        assert!(text.contains("uint8_t _p0;"));
        assert!(text.contains("_p0 = PhotonReader_ReadU8(src);"));
        assert!(text.contains("PHOTON_TRY(PhotonReader_ReadVarint(src, &_p1));"));
        assert!(text.contains("PHOTON_TRY(PhotonNav_Scale(_p0, _p1, &_rv));"));
    }

    #[test]
    fn encoder_writes_ids_then_args() {
        let package = link_one(COMP);
        let comps: Vec<_> = package.components().collect();
        let mut header = SrcBuilder::new();
        gen_encoder_header(package.store(), &comps, &mut header);
        assert!(header.view().contains("#ifdef PHOTON_HAS_CMD_TARGET_NAV"));
        assert!(header.view().contains(
            "PhotonError PhotonNav_SerializeCmd_SetPos(const PhotonNavPos* p, PhotonWriter* dest);"
        ));

        let mut out = SrcBuilder::new();
        gen_encoder_source(package.store(), &comps, 4, &mut out);
        let text = out.view();
        assert!(text.contains(
            "PHOTON_TRY_MSG(PhotonWriter_WriteVaruint(dest, 0), \"Failed to write component number\");"
        ));
        assert!(text.contains(
            "PHOTON_TRY_MSG(PhotonWriter_WriteVaruint(dest, 1), \"Failed to write cmd number\");"
        ));
        assert!(text.contains("PhotonWriter_WriteU8(dest, k);"));
    }

    #[test]
    fn decoder_header_exposes_exec_cmd() {
        let _package = link_one(COMP);
        let mut out = SrcBuilder::new();
        gen_decoder_header(&mut out);
        assert!(out.view().contains(
            "PhotonError Photon_ExecCmd(uint8_t compNum, uint8_t cmdNum, PhotonReader* src, PhotonWriter* dest);"
        ));
        assert!(out.view().starts_with("#ifndef __PHOTON_PRIVATE_CMD_DECODER_H__"));
    }
}
