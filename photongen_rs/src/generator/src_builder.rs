//! Shared text builder for all emitters.
//!
//! Thin wrapper over a `String` with helpers for the recurring C output
//! shapes: indentation, include guards, module ifdefs, size checks, loop
//! headers and byte arrays. Module names are always passed in explicitly.

/// Indent/loop-variable state threaded through inline codec emission.
#[derive(Clone, Copy, Debug)]
pub struct InlineSerContext {
    pub indent_level: u8,
    pub loop_level: u8,
}

impl Default for InlineSerContext {
    fn default() -> Self {
        InlineSerContext {
            indent_level: 1,
            loop_level: 0,
        }
    }
}

impl InlineSerContext {
    pub fn new() -> Self {
        InlineSerContext::default()
    }

    pub fn indent(self) -> Self {
        InlineSerContext {
            indent_level: self.indent_level + 1,
            loop_level: self.loop_level,
        }
    }

    pub fn inc_loop_var(self) -> Self {
        InlineSerContext {
            indent_level: self.indent_level,
            loop_level: self.loop_level + 1,
        }
    }

    pub fn loop_var(self) -> char {
        (b'a' + self.loop_level) as char
    }
}

/// Capitalize the first character.
pub fn first_upper(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Lowercase the first character.
pub fn first_lower(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[derive(Default, Debug)]
pub struct SrcBuilder {
    out: String,
}

impl SrcBuilder {
    pub fn new() -> Self {
        SrcBuilder::default()
    }

    pub fn view(&self) -> &str {
        &self.out
    }

    pub fn into_inner(self) -> String {
        self.out
    }

    pub fn clear(&mut self) {
        self.out.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn append(&mut self, s: impl AsRef<str>) {
        self.out.push_str(s.as_ref());
    }

    pub fn append_char(&mut self, c: char) {
        self.out.push(c);
    }

    pub fn eol(&mut self) {
        self.out.push('\n');
    }

    pub fn append_upper(&mut self, s: &str) {
        self.out.push_str(&s.to_ascii_uppercase());
    }

    pub fn append_with_first_upper(&mut self, s: &str) {
        self.out.push_str(&first_upper(s));
    }

    pub fn append_indent(&mut self, n: usize) {
        for _ in 0..n {
            self.out.push_str("    ");
        }
    }

    pub fn append_ctx_indent(&mut self, ctx: InlineSerContext) {
        self.append_indent(ctx.indent_level as usize);
    }

    // ---- preprocessor --------------------------------------------------

    pub fn append_mod_ifdef(&mut self, name: &str) {
        self.append("#ifdef PHOTON_HAS_MODULE_");
        self.append_upper(name);
        self.eol();
    }

    pub fn append_device_ifdef(&mut self, name: &str) {
        self.append("#ifdef PHOTON_DEVICE_");
        self.append_upper(name);
        self.eol();
    }

    pub fn append_cmd_target_ifdef(&mut self, name: &str) {
        self.append("#ifdef PHOTON_HAS_CMD_TARGET_");
        self.append_upper(name);
        self.eol();
    }

    pub fn append_tm_source_ifdef(&mut self, name: &str) {
        self.append("#ifdef PHOTON_HAS_TM_SOURCE_");
        self.append_upper(name);
        self.eol();
    }

    pub fn append_endif(&mut self) {
        self.append("#endif\n");
    }

    pub fn append_numeric_define(&mut self, name: &str, value: impl std::fmt::Display) {
        self.append(format!("#define {name} {value}\n"));
    }

    pub fn start_include_guard(&mut self, mod_name: &str, type_name: &str) {
        let guard = format!(
            "__PHOTON_{}_{}_H__",
            mod_name.to_ascii_uppercase(),
            type_name.to_ascii_uppercase()
        );
        self.append(format!("#ifndef {guard}\n#define {guard}\n"));
        self.eol();
    }

    pub fn end_include_guard(&mut self) {
        self.append("#endif\n");
        self.eol();
    }

    pub fn start_cpp_guard(&mut self) {
        self.append("#ifdef __cplusplus\nextern \"C\" {\n#endif\n\n");
    }

    pub fn end_cpp_guard(&mut self) {
        self.append("#ifdef __cplusplus\n}\n#endif\n\n");
    }

    pub fn append_pragma_once(&mut self) {
        self.append("#pragma once\n");
    }

    // ---- includes ------------------------------------------------------

    pub fn append_onboard_include(&mut self, path: &str) {
        self.append(format!("#include \"photon/{path}.h\"\n"));
    }

    pub fn append_include_with_ext(&mut self, path: &str, ext: &str) {
        self.append(format!("#include \"photon/{path}{ext}\"\n"));
    }

    pub fn append_sys_include(&mut self, path: &str) {
        self.append(format!("#include <{path}>\n"));
    }

    pub fn append_component_include(&mut self, mod_name: &str, ext: &str) {
        self.append(format!(
            "#include \"photon/{mod_name}/{}.Component{ext}\"\n",
            first_upper(mod_name)
        ));
    }

    // ---- codec helpers -------------------------------------------------

    pub fn append_readable_size_check(&mut self, ctx: InlineSerContext, size: &str) {
        self.append_ctx_indent(ctx);
        self.append(format!("if (PhotonReader_ReadableSize(src) < {size}) {{\n"));
        self.append_ctx_indent(ctx);
        self.append("    PHOTON_CRITICAL(\"Not enough data to deserialize\");\n");
        self.append_ctx_indent(ctx);
        self.append("    return PhotonError_NotEnoughData;\n");
        self.append_ctx_indent(ctx);
        self.append("}\n");
    }

    pub fn append_writable_size_check(&mut self, ctx: InlineSerContext, size: &str) {
        self.append_ctx_indent(ctx);
        self.append(format!("if (PhotonWriter_WritableSize(dest) < {size}) {{\n"));
        self.append_ctx_indent(ctx);
        self.append("    PHOTON_DEBUG(\"Not enough space to serialize\");\n");
        self.append_ctx_indent(ctx);
        self.append("    return PhotonError_NotEnoughSpace;\n");
        self.append_ctx_indent(ctx);
        self.append("}\n");
    }

    pub fn append_loop_header(&mut self, ctx: InlineSerContext, size: &str) {
        let var = ctx.loop_var();
        self.append_ctx_indent(ctx);
        self.append(format!("for (size_t {var} = 0; {var} < {size}; {var}++) {{\n"));
    }

    pub fn append_try(&mut self, expr: &str) {
        self.append(format!("PHOTON_TRY({expr});\n"));
    }

    pub fn append_try_msg(&mut self, expr: &str, msg: &str) {
        self.append(format!("PHOTON_TRY_MSG({expr}, \"{msg}\");\n"));
    }

    // ---- data ----------------------------------------------------------

    pub fn append_byte_array_definition(&mut self, prefix: &str, name: &str, data: &[u8]) {
        if prefix.is_empty() {
            self.append(format!("uint8_t {name}["));
        } else {
            self.append(format!("{prefix} uint8_t {name}["));
        }
        self.append(format!("{}] = {{", data.len()));
        const MAX_BYTES_PER_LINE: usize = 12;
        for (i, b) in data.iter().enumerate() {
            if i % MAX_BYTES_PER_LINE == 0 {
                self.append("\n   ");
            }
            self.append(format!(" 0x{b:02x},"));
        }
        self.append("\n};\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_vars_follow_nesting() {
        let ctx = InlineSerContext::new();
        assert_eq!(ctx.loop_var(), 'a');
        assert_eq!(ctx.inc_loop_var().loop_var(), 'b');
        assert_eq!(ctx.indent().indent_level, 2);
    }

    #[test]
    fn include_guard_shape() {
        let mut out = SrcBuilder::new();
        out.start_include_guard("nav", "Position");
        out.end_include_guard();
        assert_eq!(
            out.view(),
            "#ifndef __PHOTON_NAV_POSITION_H__\n#define __PHOTON_NAV_POSITION_H__\n\n#endif\n\n"
        );
    }

    #[test]
    fn byte_arrays_wrap_every_twelve_bytes() {
        let mut out = SrcBuilder::new();
        out.append_byte_array_definition("static const", "_data", &[0u8; 13]);
        let text = out.view();
        assert!(text.starts_with("static const uint8_t _data[13] = {"));
        assert_eq!(text.matches("\n   ").count(), 2);
        assert!(text.contains("0x00,"));
    }

    #[test]
    fn size_checks_mention_photon_errors() {
        let mut out = SrcBuilder::new();
        out.append_readable_size_check(InlineSerContext::new(), "sizeof(uint16_t)");
        assert!(out.view().contains("PhotonReader_ReadableSize(src) < sizeof(uint16_t)"));
        assert!(out.view().contains("return PhotonError_NotEnoughData;"));
    }
}
