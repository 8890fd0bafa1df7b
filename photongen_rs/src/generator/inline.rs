//! Inline serializer/deserializer emission.
//!
//! Walks a type and emits C statements that encode or decode one value into
//! the ambient `dest`/`src` coder. Builtins inline a size check plus a
//! primitive call, arrays emit loops, and composite types defer to their
//! generated `_Serialize`/`_Deserialize` functions. Context frames (indent
//! depth, loop variable) live on an explicit stack.

use crate::generator::src_builder::{InlineSerContext, SrcBuilder};
use crate::generator::type_repr::{onboard_symbol, onboard_type_repr};
use crate::types::{BuiltinKind, Type, TypeId, TypeStore};

pub struct InlineTypeInspector<'a> {
    store: &'a TypeStore,
    ptr_width: u64,
    ctx_stack: Vec<InlineSerContext>,
    arg_name: String,
    check_sizes: bool,
}

impl<'a> InlineTypeInspector<'a> {
    pub fn new(store: &'a TypeStore, ptr_width: u64) -> Self {
        InlineTypeInspector {
            store,
            ptr_width,
            ctx_stack: Vec::new(),
            arg_name: String::new(),
            check_sizes: true,
        }
    }

    pub fn gen_serializer(
        &mut self,
        out: &mut SrcBuilder,
        ty: TypeId,
        ctx: InlineSerContext,
        arg_name: &str,
        check_sizes: bool,
    ) {
        self.inspect_root(out, ty, ctx, arg_name, check_sizes, true);
    }

    pub fn gen_deserializer(
        &mut self,
        out: &mut SrcBuilder,
        ty: TypeId,
        ctx: InlineSerContext,
        arg_name: &str,
        check_sizes: bool,
    ) {
        self.inspect_root(out, ty, ctx, arg_name, check_sizes, false);
    }

    fn inspect_root(
        &mut self,
        out: &mut SrcBuilder,
        ty: TypeId,
        ctx: InlineSerContext,
        arg_name: &str,
        check_sizes: bool,
        ser: bool,
    ) {
        debug_assert!(self.ctx_stack.is_empty());
        self.ctx_stack.push(ctx);
        self.arg_name = arg_name.to_string();
        self.check_sizes = check_sizes;
        self.inspect(out, ty, ser);
        self.ctx_stack.pop();
    }

    fn ctx(&self) -> InlineSerContext {
        *self.ctx_stack.last().expect("context pushed")
    }

    fn inspect(&mut self, out: &mut SrcBuilder, ty: TypeId, ser: bool) {
        match self.store.get(ty) {
            Type::Builtin(kind) => self.inspect_builtin(out, *kind, ser),
            Type::Reference { .. } | Type::Function(_) => self.inspect_pointer(out, ty, ser),
            Type::Array { len, element } => self.inspect_array(out, *len, *element, ser),
            Type::DynArray { .. }
            | Type::Struct { .. }
            | Type::Variant { .. }
            | Type::Enum { .. }
            | Type::GenericInstantiation { .. } => self.inspect_non_inline(out, ty, ser),
            Type::Imported { link, .. } => {
                if let Some(link) = *link {
                    self.inspect(out, link, ser);
                }
            }
            Type::Alias { referent, .. } => {
                let referent = *referent;
                self.inspect(out, referent, ser);
            }
            Type::Generic { .. } | Type::GenericParameter { .. } => {
                debug_assert!(false, "uninstantiated generic in codec emission");
            }
        }
    }

    fn inspect_array(&mut self, out: &mut SrcBuilder, len: u64, element: TypeId, ser: bool) {
        let ctx = self.ctx();
        self.arg_name.push('[');
        self.arg_name.push(ctx.loop_var());
        self.arg_name.push(']');

        let old_check = self.check_sizes;
        if self.check_sizes
            && let Some(size) = self.store.fixed_size(element, self.ptr_width)
        {
            self.check_sizes = false;
            let total = (size * len).to_string();
            if ser {
                out.append_writable_size_check(ctx, &total);
            } else {
                out.append_readable_size_check(ctx, &total);
            }
        }
        out.append_loop_header(ctx, &len.to_string());
        self.ctx_stack.push(ctx.indent().inc_loop_var());
        self.inspect(out, element, ser);
        self.ctx_stack.pop();
        self.check_sizes = old_check;
        self.arg_name.truncate(self.arg_name.len() - 3);
        out.append_ctx_indent(ctx);
        out.append("}\n");
    }

    fn inspect_builtin(&mut self, out: &mut SrcBuilder, kind: BuiltinKind, ser: bool) {
        match kind {
            BuiltinKind::USize | BuiltinKind::ISize => {
                self.gen_sized(out, "sizeof(void*)", "USizeLe", ser)
            }
            BuiltinKind::U8 | BuiltinKind::I8 | BuiltinKind::Bool => {
                self.gen_sized(out, "sizeof(uint8_t)", "U8", ser)
            }
            BuiltinKind::U16 | BuiltinKind::I16 => {
                self.gen_sized(out, "sizeof(uint16_t)", "U16Le", ser)
            }
            BuiltinKind::U32 | BuiltinKind::I32 => {
                self.gen_sized(out, "sizeof(uint32_t)", "U32Le", ser)
            }
            BuiltinKind::U64 | BuiltinKind::I64 => {
                self.gen_sized(out, "sizeof(uint64_t)", "U64Le", ser)
            }
            BuiltinKind::F32 => self.gen_sized(out, "sizeof(float)", "F32Le", ser),
            BuiltinKind::F64 => self.gen_sized(out, "sizeof(double)", "F64Le", ser),
            BuiltinKind::Char => self.gen_sized(out, "sizeof(char)", "Char", ser),
            BuiltinKind::Varuint => self.gen_var(out, "Varuint", ser),
            BuiltinKind::Varint => self.gen_var(out, "Varint", ser),
            BuiltinKind::Void => {
                debug_assert!(false, "void value in codec emission");
            }
        }
    }

    fn gen_sized(&mut self, out: &mut SrcBuilder, size: &str, suffix: &str, ser: bool) {
        let ctx = self.ctx();
        if ser {
            if self.check_sizes {
                out.append_writable_size_check(ctx, size);
            }
            out.append_ctx_indent(ctx);
            out.append(format!(
                "PhotonWriter_Write{suffix}(dest, {});\n",
                self.arg_name
            ));
        } else {
            if self.check_sizes {
                out.append_readable_size_check(ctx, size);
            }
            out.append_ctx_indent(ctx);
            out.append(format!(
                "{} = PhotonReader_Read{suffix}(src);\n",
                self.arg_name
            ));
        }
    }

    fn gen_var(&mut self, out: &mut SrcBuilder, suffix: &str, ser: bool) {
        let ctx = self.ctx();
        out.append_ctx_indent(ctx);
        if ser {
            out.append_try(&format!(
                "PhotonWriter_Write{suffix}(dest, {})",
                self.arg_name
            ));
        } else {
            out.append_try(&format!(
                "PhotonReader_Read{suffix}(src, &{})",
                self.arg_name
            ));
        }
    }

    fn inspect_pointer(&mut self, out: &mut SrcBuilder, ty: TypeId, ser: bool) {
        let ctx = self.ctx();
        if ser {
            if self.check_sizes {
                out.append_writable_size_check(ctx, "sizeof(void*)");
            }
            out.append_ctx_indent(ctx);
            out.append(format!(
                "PhotonWriter_WritePtrLe(dest, (const void*){});\n",
                self.arg_name
            ));
        } else {
            if self.check_sizes {
                out.append_readable_size_check(ctx, "sizeof(void*)");
            }
            out.append_ctx_indent(ctx);
            out.append(format!(
                "{} = ({})PhotonReader_ReadPtrLe(src);\n",
                self.arg_name,
                onboard_type_repr(self.store, ty)
            ));
        }
    }

    fn inspect_non_inline(&mut self, out: &mut SrcBuilder, ty: TypeId, ser: bool) {
        let ctx = self.ctx();
        let symbol = onboard_symbol(self.store, ty);
        let is_enum = matches!(
            self.store.resolve_final(ty).map(|t| self.store.get(t)),
            Some(Type::Enum { .. })
        );
        out.append_ctx_indent(ctx);
        if ser {
            let amp = if is_enum { "" } else { "&" };
            out.append_try(&format!(
                "{symbol}_Serialize({amp}{}, dest)",
                self.arg_name
            ));
        } else {
            out.append_try(&format!("{symbol}_Deserialize(&{}, src)", self.arg_name));
        }
    }
}

/// Emit a field sequence, coalescing consecutive fixed-size members under a
/// single size check.
pub fn inspect_fields(
    inspector: &mut InlineTypeInspector<'_>,
    out: &mut SrcBuilder,
    store: &TypeStore,
    ptr_width: u64,
    items: &[(String, TypeId)],
    ctx: InlineSerContext,
    ser: bool,
) {
    let mut i = 0;
    while i < items.len() {
        if let Some(mut total) = store.fixed_size(items[i].1, ptr_width) {
            let mut j = i + 1;
            while j < items.len() {
                match store.fixed_size(items[j].1, ptr_width) {
                    Some(size) => {
                        total += size;
                        j += 1;
                    }
                    None => break,
                }
            }
            if ser {
                out.append_writable_size_check(ctx, &total.to_string());
            } else {
                out.append_readable_size_check(ctx, &total.to_string());
            }
            for (name, ty) in &items[i..j] {
                if ser {
                    inspector.gen_serializer(out, *ty, ctx, name, false);
                } else {
                    inspector.gen_deserializer(out, *ty, ctx, name, false);
                }
            }
            i = j;
        } else {
            let (name, ty) = &items[i];
            if ser {
                inspector.gen_serializer(out, *ty, ctx, name, true);
            } else {
                inspector.gen_deserializer(out, *ty, ctx, name, true);
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::package::Package;

    fn link_one(src: &str) -> Package {
        let mut diag = Diagnostics::new();
        Package::from_sources(&mut diag, vec![("m.decode".into(), src.into())])
            .expect("link failed")
    }

    fn ser_text(package: &Package, ty: TypeId, arg: &str) -> String {
        let mut out = SrcBuilder::new();
        let mut insp = InlineTypeInspector::new(package.store(), 4);
        insp.gen_serializer(&mut out, ty, InlineSerContext::new(), arg, true);
        out.into_inner()
    }

    fn deser_text(package: &Package, ty: TypeId, arg: &str) -> String {
        let mut out = SrcBuilder::new();
        let mut insp = InlineTypeInspector::new(package.store(), 4);
        insp.gen_deserializer(&mut out, ty, InlineSerContext::new(), arg, true);
        out.into_inner()
    }

    fn field_ty(package: &Package, type_name: &str, idx: usize) -> TypeId {
        let ast = package.module_with_name("m").unwrap();
        let id = ast.find_type_with_name(type_name).unwrap();
        let Type::Struct { fields, .. } = package.store().get(id) else {
            panic!()
        };
        fields[idx].ty
    }

    #[test]
    fn builtin_emits_size_check_and_primitive_call() {
        let package = link_one("module m\nstruct S { a: u16 }");
        let ty = field_ty(&package, "S", 0);
        let text = ser_text(&package, ty, "self->a");
        assert!(text.contains("PhotonWriter_WritableSize(dest) < sizeof(uint16_t)"));
        assert!(text.contains("PhotonWriter_WriteU16Le(dest, self->a);"));
        let text = deser_text(&package, ty, "self->a");
        assert!(text.contains("self->a = PhotonReader_ReadU16Le(src);"));
    }

    #[test]
    fn varints_go_through_try_macro() {
        let package = link_one("module m\nstruct S { a: varint }");
        let ty = field_ty(&package, "S", 0);
        assert!(
            ser_text(&package, ty, "self->a")
                .contains("PHOTON_TRY(PhotonWriter_WriteVarint(dest, self->a));")
        );
        assert!(
            deser_text(&package, ty, "self->a")
                .contains("PHOTON_TRY(PhotonReader_ReadVarint(src, &self->a));")
        );
    }

    #[test]
    fn fixed_arrays_hoist_one_size_check() {
        let package = link_one("module m\nstruct S { a: [u16; 4] }");
        let ty = field_ty(&package, "S", 0);
        let text = ser_text(&package, ty, "self->a");
        // One coalesced check of 8 bytes, then a loop without inner checks.
        assert!(text.contains("PhotonWriter_WritableSize(dest) < 8"));
        assert!(text.contains("for (size_t a = 0; a < 4; a++) {"));
        assert!(text.contains("PhotonWriter_WriteU16Le(dest, self->a[a]);"));
        assert_eq!(text.matches("WritableSize").count(), 1);
    }

    #[test]
    fn variable_arrays_check_inside_the_loop() {
        let package = link_one("module m\nstruct S { a: [varuint; 2] }");
        let ty = field_ty(&package, "S", 0);
        let text = ser_text(&package, ty, "self->a");
        assert!(text.contains("for (size_t a = 0; a < 2; a++) {"));
        assert!(text.contains("PHOTON_TRY(PhotonWriter_WriteVaruint(dest, self->a[a]));"));
    }

    #[test]
    fn nested_arrays_use_fresh_loop_vars() {
        let package = link_one("module m\nstruct S { a: [[u8; 2]; 3] }");
        let ty = field_ty(&package, "S", 0);
        let text = ser_text(&package, ty, "self->a");
        assert!(text.contains("for (size_t a = 0; a < 3; a++) {"));
        assert!(text.contains("for (size_t b = 0; b < 2; b++) {"));
        assert!(text.contains("self->a[a][b]"));
    }

    #[test]
    fn named_types_defer_to_generated_codecs() {
        let package = link_one(
            "module m\nenum E { A = 0 }\nstruct Inner { v: u8 }\nstruct S { e: E, i: Inner }",
        );
        let e = field_ty(&package, "S", 0);
        let i = field_ty(&package, "S", 1);
        // Enums pass by value when serializing.
        assert!(
            ser_text(&package, e, "self->e").contains("PHOTON_TRY(PhotonME_Serialize(self->e, dest));")
        );
        assert!(
            deser_text(&package, e, "self->e")
                .contains("PHOTON_TRY(PhotonME_Deserialize(&self->e, src));")
        );
        assert!(
            ser_text(&package, i, "self->i")
                .contains("PHOTON_TRY(PhotonMInner_Serialize(&self->i, dest));")
        );
    }

    #[test]
    fn pointers_use_ptr_codec() {
        let package = link_one("module m\nstruct S { p: *const u32 }");
        let ty = field_ty(&package, "S", 0);
        assert!(
            ser_text(&package, ty, "self->p")
                .contains("PhotonWriter_WritePtrLe(dest, (const void*)self->p);")
        );
        assert!(
            deser_text(&package, ty, "self->p")
                .contains("self->p = (uint32_t const*)PhotonReader_ReadPtrLe(src);")
        );
    }

    #[test]
    fn field_runs_coalesce_until_variable_member() {
        let package = link_one("module m\nstruct S { a: u16, b: u8, c: varint, d: u32 }");
        let ast = package.module_with_name("m").unwrap();
        let id = ast.find_type_with_name("S").unwrap();
        let Type::Struct { fields, .. } = package.store().get(id) else {
            panic!()
        };
        let items: Vec<(String, TypeId)> = fields
            .iter()
            .map(|f| (format!("self->{}", f.name), f.ty))
            .collect();
        let mut out = SrcBuilder::new();
        let mut insp = InlineTypeInspector::new(package.store(), 4);
        inspect_fields(
            &mut insp,
            &mut out,
            package.store(),
            4,
            &items,
            InlineSerContext::new(),
            true,
        );
        let text = out.into_inner();
        // a+b coalesce to 3 bytes, c breaks the run, d gets its own 4.
        assert!(text.contains("WritableSize(dest) < 3"));
        assert!(text.contains("WritableSize(dest) < 4"));
        assert!(text.contains("PHOTON_TRY(PhotonWriter_WriteVarint(dest, self->c));"));
        assert_eq!(text.matches("WritableSize").count(), 2);
    }
}
