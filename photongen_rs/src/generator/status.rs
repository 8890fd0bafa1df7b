//! Status message encoders and decoders.
//!
//! Each (component, message) pair gets one function that walks the message's
//! accessor paths over the component state variables. Slices emit a leading
//! varuint length, ranges emit bounded loops, indices subscript directly.

use crate::ast::{Accessor, Component, StatusMsg, StatusRegexp, Subscript};
use crate::generator::inline::InlineTypeInspector;
use crate::generator::src_builder::{InlineSerContext, SrcBuilder, first_upper};
use crate::types::{Type, TypeId, TypeStore};

fn encoder_func_name(comp: &Component, msg: &StatusMsg) -> String {
    format!(
        "Photon{}_SerializeStatus_{}",
        first_upper(comp.module_name()),
        first_upper(&msg.name())
    )
}

fn decoder_func_name(comp: &Component, msg: &StatusMsg) -> String {
    format!(
        "Photon{}_DeserializeStatus_{}",
        first_upper(comp.module_name()),
        first_upper(&msg.name())
    )
}

// ---- headers ------------------------------------------------------------

pub fn gen_encoder_header(messages: &[(&Component, &StatusMsg)], out: &mut SrcBuilder) {
    out.start_include_guard("PRIVATE", "STATUS_ENCODER");
    out.append_onboard_include("core/Error");
    out.append_onboard_include("core/Writer");
    out.eol();
    out.start_cpp_guard();
    for (comp, msg) in messages {
        out.append_mod_ifdef(comp.module_name());
        out.append(format!(
            "PhotonError {}(PhotonWriter* dest);\n",
            encoder_func_name(comp, msg)
        ));
        out.append_endif();
    }
    out.eol();
    out.end_cpp_guard();
    out.end_include_guard();
}

pub fn gen_decoder_header(messages: &[(&Component, &StatusMsg)], out: &mut SrcBuilder) {
    out.start_include_guard("PRIVATE", "STATUS_DECODER");
    out.append_onboard_include("core/Error");
    out.append_onboard_include("core/Reader");
    out.eol();
    out.start_cpp_guard();
    for (comp, msg) in messages {
        out.append_tm_source_ifdef(comp.module_name());
        out.append(format!(
            "PhotonError {}(PhotonReader* src);\n",
            decoder_func_name(comp, msg)
        ));
        out.append_endif();
    }
    out.eol();
    out.end_cpp_guard();
    out.end_include_guard();
}

// ---- sources ------------------------------------------------------------

fn append_component_includes(
    store: &TypeStore,
    messages: &[(&Component, &StatusMsg)],
    out: &mut SrcBuilder,
) {
    use crate::generator::depends::{Depends, DependsCollector, gen_onboard_includes};
    let mut seen = Vec::new();
    for (comp, _) in messages {
        if seen.contains(&comp.number) {
            continue;
        }
        seen.push(comp.number);
        let collector = DependsCollector::new(store);
        let mut deps = Depends::new();
        for msg in &comp.statuses {
            collector.collect_status(msg, &mut deps);
        }
        out.append_mod_ifdef(comp.module_name());
        gen_onboard_includes(store, &deps, ".h", out);
        out.append_component_include(comp.module_name(), ".h");
        out.append_endif();
    }
    out.eol();
}

pub fn gen_encoder_source(
    store: &TypeStore,
    messages: &[(&Component, &StatusMsg)],
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    out.append_onboard_include("StatusEncoder.Private");
    out.append_onboard_include("core/Writer");
    out.append_onboard_include("core/Error");
    out.append_onboard_include("core/Try");
    out.append_onboard_include("core/Logging");
    out.eol();
    out.append("#define _PHOTON_FNAME \"photon/StatusEncoder.Private.c\"\n\n");
    append_component_includes(store, messages, out);

    for (comp, msg) in messages {
        out.append_mod_ifdef(comp.module_name());
        out.append(format!(
            "PhotonError {}(PhotonWriter* dest)\n{{\n",
            encoder_func_name(comp, msg)
        ));
        for part in &msg.parts {
            gen_part_codec(store, comp, part, ptr_width, true, out);
        }
        out.append("    return PhotonError_Ok;\n}\n");
        out.append_endif();
        out.eol();
    }
    out.append("#undef _PHOTON_FNAME\n");
}

pub fn gen_decoder_source(
    store: &TypeStore,
    messages: &[(&Component, &StatusMsg)],
    ptr_width: u64,
    out: &mut SrcBuilder,
) {
    out.append_onboard_include("StatusDecoder.Private");
    out.append_onboard_include("core/Reader");
    out.append_onboard_include("core/Error");
    out.append_onboard_include("core/Try");
    out.append_onboard_include("core/Logging");
    out.eol();
    out.append("#define _PHOTON_FNAME \"photon/StatusDecoder.Private.c\"\n\n");
    append_component_includes(store, messages, out);

    for (comp, msg) in messages {
        out.append_tm_source_ifdef(comp.module_name());
        out.append(format!(
            "PhotonError {}(PhotonReader* src)\n{{\n",
            decoder_func_name(comp, msg)
        ));
        if msg_has_dyn_array(store, msg) {
            out.append("    uint64_t size;\n");
        }
        for part in &msg.parts {
            gen_part_codec(store, comp, part, ptr_width, false, out);
        }
        out.append("    return PhotonError_Ok;\n}\n");
        out.append_endif();
        out.eol();
    }
    out.append("#undef _PHOTON_FNAME\n");
}

fn msg_has_dyn_array(store: &TypeStore, msg: &StatusMsg) -> bool {
    msg.parts.iter().any(|part| {
        part.accessors.iter().any(|acc| match acc {
            Accessor::Subscript { container_ty, .. } => matches!(
                container_ty.map(|t| store.get(t)),
                Some(Type::DynArray { .. })
            ),
            _ => false,
        })
    })
}

/// Emit the reads or writes for one accessor path.
fn gen_part_codec(
    store: &TypeStore,
    comp: &Component,
    part: &StatusRegexp,
    ptr_width: u64,
    ser: bool,
    out: &mut SrcBuilder,
) {
    if !part.has_accessors() {
        return;
    }
    let mut ctx = InlineSerContext::new();
    let mut field = format!("_photon{}", first_upper(comp.module_name()));
    let mut last_type: Option<TypeId> = None;

    for acc in &part.accessors {
        match acc {
            Accessor::Field { name, field_ty } => {
                field.push('.');
                field.push_str(name);
                last_type = *field_ty;
            }
            Accessor::Subscript { sub, container_ty } => {
                let container = container_ty.expect("linked subscript");
                let (is_dyn, max, element) = match store.get(container) {
                    Type::DynArray {
                        max_size, element, ..
                    } => (true, *max_size, *element),
                    Type::Array { len, element } => (false, *len, *element),
                    _ => unreachable!("linker validated subscript containers"),
                };
                if is_dyn {
                    if ser {
                        out.append_ctx_indent(ctx);
                        out.append_try(&format!(
                            "PhotonWriter_WriteVaruint(dest, {field}.size)"
                        ));
                    } else {
                        out.append_ctx_indent(ctx);
                        out.append_try("PhotonReader_ReadVaruint(src, &size)");
                        out.append_ctx_indent(ctx);
                        out.append(format!(
                            "if (size > {max}) {{\n"
                        ));
                        out.append_ctx_indent(ctx);
                        out.append("    return PhotonError_InvalidValue;\n");
                        out.append_ctx_indent(ctx);
                        out.append("}\n");
                        out.append_ctx_indent(ctx);
                        out.append(format!("{field}.size = (size_t)size;\n"));
                    }
                }
                last_type = Some(element);
                match sub {
                    Subscript::Index(i) => {
                        if is_dyn {
                            field.push_str(".data");
                        }
                        field.push_str(&format!("[{i}]"));
                    }
                    Subscript::Range { lower, upper } => {
                        let var = ctx.loop_var();
                        let lower = lower.unwrap_or(0).to_string();
                        let upper = match upper {
                            Some(u) => u.to_string(),
                            None => {
                                if is_dyn {
                                    if ser {
                                        format!("{field}.size")
                                    } else {
                                        "size".to_string()
                                    }
                                } else {
                                    max.to_string()
                                }
                            }
                        };
                        out.append_ctx_indent(ctx);
                        out.append(format!(
                            "for (size_t {var} = {lower}; {var} < {upper}; {var}++) {{\n"
                        ));
                        if is_dyn {
                            field.push_str(".data");
                        }
                        field.push_str(&format!("[{var}]"));
                        ctx = ctx.inc_loop_var().indent();
                    }
                }
            }
        }
    }

    let Some(terminal) = last_type else {
        return;
    };
    let mut inspector = InlineTypeInspector::new(store, ptr_width);
    if ser {
        inspector.gen_serializer(out, terminal, ctx, &field, true);
    } else {
        inspector.gen_deserializer(out, terminal, ctx, &field, true);
    }
    for indent in (1..ctx.indent_level).rev() {
        out.append_indent(indent as usize);
        out.append("}\n");
    }
}

/// The telemetry message descriptor table (`Tm.Private.inc.c`).
pub fn gen_tm_private(messages: &[(&Component, &StatusMsg)], out: &mut SrcBuilder) {
    out.append("static PhotonTmMessageDesc _messageDesc[] = {\n");
    for (comp, msg) in messages {
        out.append_mod_ifdef(comp.module_name());
        out.append_indent(1);
        out.append(format!(
            "{{.func = {}, .compNum = {}, .msgNum = {}, .interest = 0, .priority = {}, .isEnabled = {}}},\n",
            encoder_func_name(comp, msg),
            comp.number,
            msg.number,
            msg.priority,
            msg.is_enabled
        ));
        out.append_endif();
    }
    out.append("};\n\n");
    out.append("#define _PHOTON_TM_MSG_COUNT sizeof(_messageDesc) / sizeof(_messageDesc[0])\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::package::Package;

    const NAV: &str = "module nav\n\
        struct LatLon { latitude: f64, longitude: f64 }\n\
        struct Position { latLon: LatLon, altitude: f64 }\n\
        component {\n\
            parameters {\n\
                pos: Position,\n\
                velocities: [f32; 3],\n\
                track: &[u16; 8]\n\
            }\n\
            statuses {\n\
                [0, 0, true]: pos.latLon.latitude,\n\
                [1, 1, true]: velocities[0..2],\n\
                [2, 0, false]: track[..]\n\
            }\n\
        }";

    fn link_nav() -> Package {
        let mut diag = Diagnostics::new();
        Package::from_sources(&mut diag, vec![("nav.decode".into(), NAV.into())])
            .expect("link failed")
    }

    fn encoder_text(package: &Package) -> String {
        let messages: Vec<_> = package.status_msgs().collect();
        let mut out = SrcBuilder::new();
        gen_encoder_source(package.store(), &messages, 4, &mut out);
        out.into_inner()
    }

    #[test]
    fn field_paths_serialize_the_terminal_value() {
        let package = link_nav();
        let text = encoder_text(&package);
        assert!(text.contains("PhotonError PhotonNav_SerializeStatus_Msg0(PhotonWriter* dest)"));
        assert!(text.contains(
            "PhotonWriter_WriteF64Le(dest, _photonNav.pos.latLon.latitude);"
        ));
        // 8 byte size check for one little-endian double.
        assert!(text.contains("PhotonWriter_WritableSize(dest) < sizeof(double)"));
    }

    #[test]
    fn ranges_emit_bounded_loops() {
        let package = link_nav();
        let text = encoder_text(&package);
        assert!(text.contains("for (size_t a = 0; a < 2; a++) {"));
        assert!(text.contains("PhotonWriter_WriteF32Le(dest, _photonNav.velocities[a]);"));
    }

    #[test]
    fn slices_write_length_then_elements() {
        let package = link_nav();
        let text = encoder_text(&package);
        assert!(text.contains(
            "PHOTON_TRY(PhotonWriter_WriteVaruint(dest, _photonNav.track.size));"
        ));
        assert!(text.contains("for (size_t a = 0; a < _photonNav.track.size; a++) {"));
        assert!(text.contains("PhotonWriter_WriteU16Le(dest, _photonNav.track.data[a]);"));
    }

    #[test]
    fn decoder_mirrors_encoder_with_bound_checks() {
        let package = link_nav();
        let messages: Vec<_> = package.status_msgs().collect();
        let mut out = SrcBuilder::new();
        gen_decoder_source(package.store(), &messages, 4, &mut out);
        let text = out.view();
        assert!(text.contains("PhotonError PhotonNav_DeserializeStatus_Msg2(PhotonReader* src)"));
        assert!(text.contains("uint64_t size;"));
        assert!(text.contains("PHOTON_TRY(PhotonReader_ReadVaruint(src, &size));"));
        assert!(text.contains("if (size > 8) {"));
        assert!(text.contains("_photonNav.track.size = (size_t)size;"));
        assert!(text.contains(
            "_photonNav.pos.latLon.latitude = PhotonReader_ReadF64Le(src);"
        ));
        assert!(text.contains("#ifdef PHOTON_HAS_TM_SOURCE_NAV"));
    }

    #[test]
    fn headers_guard_each_declaration_with_module_ifdefs() {
        let package = link_nav();
        let messages: Vec<_> = package.status_msgs().collect();
        let mut out = SrcBuilder::new();
        gen_encoder_header(&messages, &mut out);
        let text = out.view();
        assert!(text.contains("#ifdef PHOTON_HAS_MODULE_NAV"));
        assert!(text.contains("PhotonError PhotonNav_SerializeStatus_Msg1(PhotonWriter* dest);"));
    }

    #[test]
    fn tm_table_lists_every_message() {
        let package = link_nav();
        let messages: Vec<_> = package.status_msgs().collect();
        let mut out = SrcBuilder::new();
        gen_tm_private(&messages, &mut out);
        let text = out.view();
        assert!(text.contains("static PhotonTmMessageDesc _messageDesc[] = {"));
        assert!(text.contains(
            "{.func = PhotonNav_SerializeStatus_Msg0, .compNum = 0, .msgNum = 0, .interest = 0, .priority = 0, .isEnabled = true},"
        ));
        assert!(text.contains(".msgNum = 2, .interest = 0, .priority = 0, .isEnabled = false}"));
        assert!(text.contains("#define _PHOTON_TM_MSG_COUNT"));
    }
}
