//! Recursive descent parser for `.decode` module files.
//!
//! Tokens are consumed explicitly, one declaration at a time, in the fixed
//! order: module declaration, imports, top-level items. Every failure appends
//! a report to [`Diagnostics`] and unwinds via `Option`, so a failed parse
//! never yields a partial AST for the enclosing declaration.

use std::sync::Arc;

use crate::ast::{
    Accessor, Ast, Component, Constant, DocBlock, Function, ImplBlock, ImportDecl, ModuleInfo,
    StatusMsg, StatusRegexp, Subscript,
};
use crate::diag::{Diagnostics, FileInfo, Level};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::types::{
    Field, FunctionType, ReferenceKind, SelfArgument, Type, TypeId, TypeStore, VariantField,
};

/// Element bound of `&[T]` when the source does not give one explicitly
/// (`&[T; N]`).
pub const DEFAULT_DYN_ARRAY_MAX: u64 = 64;

/// Conditional compilation predicate from a `#[cfg(...)]` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CfgOption {
    Single { key: String, value: Option<String> },
    Not(String),
    Any(Vec<CfgOption>),
    All(Vec<CfgOption>),
}

/// Parse one module file into an [`Ast`], allocating types into `store`.
/// Returns `None` after appending at least one error report.
pub fn parse_file(
    file: &Arc<FileInfo>,
    store: &mut TypeStore,
    diag: &mut Diagnostics,
) -> Option<Ast> {
    let tokens = tokenize(file.contents());
    let mut parser = FileParser {
        file: Arc::clone(file),
        tokens,
        pos: 0,
        store,
        diag,
        module: None,
        ast: None,
        docs: Vec::new(),
        generic_params: Vec::new(),
    };
    parser.parse()
}

struct FileParser<'a> {
    file: Arc<FileInfo>,
    tokens: Vec<Token>,
    pos: usize,
    store: &'a mut TypeStore,
    diag: &'a mut Diagnostics,
    module: Option<Arc<ModuleInfo>>,
    ast: Option<Ast>,
    docs: Vec<String>,
    /// Generic parameters in scope while parsing a generic body.
    generic_params: Vec<(String, TypeId)>,
}

impl<'a> FileParser<'a> {
    fn parse(mut self) -> Option<Ast> {
        self.skip_comments_and_space()?;
        self.parse_module_decl()?;
        self.parse_imports()?;
        self.parse_top_level_decls()?;
        self.ast
    }

    // ---- token cursor -------------------------------------------------

    fn current(&self) -> Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        self.tokens[idx]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn next_is(&self, kind: TokenKind) -> bool {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        self.tokens[idx].kind == kind
    }

    fn consume(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn value(&self, tok: Token) -> &str {
        tok.value(self.file.contents())
    }

    fn current_value(&self) -> String {
        self.value(self.current()).to_string()
    }

    // ---- error reporting ----------------------------------------------

    fn report_token(&mut self, tok: Token, msg: impl Into<String>) {
        self.diag
            .report(&self.file, Level::Error, Some(tok.location), msg);
    }

    fn report_current(&mut self, msg: impl Into<String>) -> Option<()> {
        let tok = self.current();
        self.report_token(tok, msg);
        None
    }

    fn expect(&mut self, kind: TokenKind) -> Option<()> {
        if self.kind() != kind {
            let msg = format!("expected {}", kind.describe());
            return self.report_current(msg);
        }
        Some(())
    }

    fn expect_msg(&mut self, kind: TokenKind, msg: &str) -> Option<()> {
        if self.kind() != kind {
            return self.report_current(msg.to_string());
        }
        Some(())
    }

    // ---- whitespace and docs ------------------------------------------

    fn skip_comments_and_space(&mut self) -> Option<()> {
        loop {
            match self.kind() {
                TokenKind::Blank | TokenKind::Eol => self.consume(),
                TokenKind::DocComment => {
                    let text = self
                        .current_value()
                        .trim_start_matches('/')
                        .trim()
                        .to_string();
                    self.docs.push(text);
                    self.consume();
                }
                TokenKind::Eof => return Some(()),
                TokenKind::Invalid => return self.report_current("invalid token"),
                _ => return Some(()),
            }
        }
    }

    fn skip_blanks(&mut self) {
        while self.kind() == TokenKind::Blank {
            self.consume();
        }
    }

    fn consume_and_skip_blanks(&mut self) {
        self.consume();
        self.skip_blanks();
    }

    fn take_docs(&mut self) -> Option<DocBlock> {
        if self.docs.is_empty() {
            return None;
        }
        Some(DocBlock::new(std::mem::take(&mut self.docs)))
    }

    fn clear_unused_docs(&mut self) {
        self.docs.clear();
    }

    fn module(&self) -> Arc<ModuleInfo> {
        Arc::clone(self.module.as_ref().expect("module declared"))
    }

    fn ast_mut(&mut self) -> &mut Ast {
        self.ast.as_mut().expect("ast created")
    }

    // ---- numbers -------------------------------------------------------

    fn parse_unsigned(&mut self) -> Option<u64> {
        self.expect_msg(TokenKind::Number, "error parsing unsigned integer")?;
        let text = self.current_value();
        let Ok(value) = text.parse::<u64>() else {
            return self.report_current("unsigned integer too big").map(|_| 0);
        };
        self.consume();
        Some(value)
    }

    fn parse_signed(&mut self) -> Option<i64> {
        let negative = if self.kind() == TokenKind::Dash {
            self.consume();
            self.expect_msg(TokenKind::Number, "expected integer after sign")?;
            true
        } else {
            false
        };
        self.expect_msg(TokenKind::Number, "expected integer")?;
        let text = self.current_value();
        let magnitude = match text.parse::<i128>() {
            Ok(v) => v,
            Err(_) => return self.report_current("integer too big").map(|_| 0),
        };
        let value = if negative { -magnitude } else { magnitude };
        if i64::try_from(value).is_err() {
            return self.report_current("integer too big").map(|_| 0);
        }
        self.consume();
        Some(value as i64)
    }

    // ---- generic list helper ------------------------------------------

    fn parse_list<F>(
        &mut self,
        open: TokenKind,
        sep: TokenKind,
        close: TokenKind,
        mut entry: F,
    ) -> Option<()>
    where
        F: FnMut(&mut Self) -> Option<()>,
    {
        self.expect(open)?;
        self.consume();
        self.skip_comments_and_space()?;
        loop {
            if self.kind() == close {
                self.consume();
                return Some(());
            }
            if self.kind() == TokenKind::Eof {
                return self.report_current(format!("expected {}", close.describe()));
            }
            entry(&mut *self)?;
            self.skip_comments_and_space()?;
            if self.kind() == sep {
                self.consume();
            }
            self.skip_comments_and_space()?;
        }
    }

    fn parse_brace_list<F>(&mut self, entry: F) -> Option<()>
    where
        F: FnMut(&mut Self) -> Option<()>,
    {
        self.parse_list(TokenKind::LBrace, TokenKind::Comma, TokenKind::RBrace, entry)
    }

    // ---- module / imports ---------------------------------------------

    fn parse_module_decl(&mut self) -> Option<()> {
        let docs = self.take_docs();
        self.expect_msg(
            TokenKind::Module,
            "every module must begin with module declaration",
        )?;
        self.consume();
        self.expect_msg(TokenKind::Blank, "missing blanks after module keyword")?;
        self.consume();
        self.expect_msg(TokenKind::Identifier, "module name must be an identifier")?;
        let name = self.current_value();
        let module = ModuleInfo::new(name, Arc::clone(&self.file));
        self.module = Some(Arc::clone(&module));
        self.ast = Some(Ast::new(module, docs));
        self.consume();
        self.clear_unused_docs();
        Some(())
    }

    fn parse_imports(&mut self) -> Option<()> {
        loop {
            self.skip_comments_and_space()?;
            if self.kind() != TokenKind::Import {
                break;
            }
            self.consume();
            self.expect_msg(TokenKind::Blank, "missing blanks after import declaration")?;
            self.consume();
            self.expect_msg(
                TokenKind::Identifier,
                "imported module name must be an identifier",
            )?;
            let path = self.current_value();
            if self
                .ast
                .as_ref()
                .is_some_and(|a| a.imports.iter().any(|i| i.path == path))
            {
                return self.report_current("duplicate import");
            }
            self.consume();
            self.expect(TokenKind::DoubleColon)?;
            self.consume();

            let mut decl = ImportDecl {
                path: path.clone(),
                types: Vec::new(),
            };
            match self.kind() {
                TokenKind::Identifier => {
                    self.parse_imported_type(&mut decl)?;
                }
                TokenKind::LBrace => {
                    self.consume();
                    loop {
                        self.expect(TokenKind::Identifier)?;
                        self.parse_imported_type(&mut decl)?;
                        self.skip_blanks();
                        match self.kind() {
                            TokenKind::Comma => self.consume_and_skip_blanks(),
                            TokenKind::RBrace => {
                                self.consume();
                                break;
                            }
                            _ => return self.report_current("expected ',' or '}'"),
                        }
                    }
                }
                _ => return self.report_current("expected identifier or '{'"),
            }
            self.ast_mut().imports.push(decl);
        }
        self.clear_unused_docs();
        Some(())
    }

    fn parse_imported_type(&mut self, decl: &mut ImportDecl) -> Option<()> {
        let name = self.current_value();
        let exists = decl.types.iter().any(|id| {
            self.store.get(*id).name() == Some(name.as_str())
        });
        if exists {
            return self.report_current("duplicate import");
        }
        let module = self.module();
        let id = self.store.add(Type::Imported {
            name: name.clone(),
            import_path: decl.path.clone(),
            module,
            link: None,
        });
        if !self.ast_mut().add_top_level_type(&name, id) {
            let msg = format!("duplicate top level name {name}");
            return self.report_current(msg);
        }
        decl.types.push(id);
        self.consume();
        Some(())
    }

    // ---- top level -----------------------------------------------------

    fn parse_top_level_decls(&mut self) -> Option<()> {
        loop {
            self.skip_comments_and_space()?;
            match self.kind() {
                TokenKind::Hash => {
                    self.parse_attribute()?;
                }
                TokenKind::Struct => self.parse_struct()?,
                TokenKind::Enum => self.parse_enum()?,
                TokenKind::Variant => self.parse_variant()?,
                TokenKind::Component => self.parse_component()?,
                TokenKind::Impl => self.parse_impl_block()?,
                TokenKind::Type => self.parse_alias()?,
                TokenKind::Const => self.parse_constant()?,
                TokenKind::Eof => return Some(()),
                _ => return self.report_current("unexpected top level declaration"),
            }
        }
    }

    // ---- attributes ----------------------------------------------------

    fn parse_attribute(&mut self) -> Option<CfgOption> {
        self.expect(TokenKind::Hash)?;
        self.consume();
        self.expect(TokenKind::LBracket)?;
        self.consume_and_skip_blanks();
        self.expect_msg(TokenKind::Identifier, "expected attribute identifier")?;
        if self.current_value() != "cfg" {
            self.report_current("only cfg attributes are supported")?;
        }
        self.consume_and_skip_blanks();
        self.expect(TokenKind::LParen)?;
        self.consume_and_skip_blanks();
        let opt = self.parse_cfg_option()?;
        self.expect(TokenKind::RParen)?;
        self.consume_and_skip_blanks();
        self.expect(TokenKind::RBracket)?;
        self.consume();
        Some(opt)
    }

    fn parse_cfg_option(&mut self) -> Option<CfgOption> {
        self.skip_blanks();
        self.expect(TokenKind::Identifier)?;
        let head = self.current_value();
        let opt = match head.as_str() {
            "not" => {
                self.consume_and_skip_blanks();
                self.expect(TokenKind::LParen)?;
                self.consume_and_skip_blanks();
                self.expect(TokenKind::Identifier)?;
                let key = self.current_value();
                self.consume_and_skip_blanks();
                self.expect(TokenKind::RParen)?;
                self.consume_and_skip_blanks();
                CfgOption::Not(key)
            }
            "any" | "all" => {
                self.consume_and_skip_blanks();
                let mut options = Vec::new();
                self.parse_list(
                    TokenKind::LParen,
                    TokenKind::Comma,
                    TokenKind::RParen,
                    |p| {
                        options.push(p.parse_cfg_option()?);
                        Some(())
                    },
                )?;
                if head == "any" {
                    CfgOption::Any(options)
                } else {
                    CfgOption::All(options)
                }
            }
            _ => {
                self.consume_and_skip_blanks();
                let value = if self.kind() == TokenKind::Equality {
                    self.consume_and_skip_blanks();
                    if !matches!(self.kind(), TokenKind::Identifier | TokenKind::Number) {
                        return self.report_current("expected attribute value").map(|_| {
                            CfgOption::Not(String::new())
                        });
                    }
                    let v = self.current_value();
                    self.consume_and_skip_blanks();
                    Some(v)
                } else {
                    None
                };
                CfgOption::Single { key: head, value }
            }
        };
        self.skip_blanks();
        Some(opt)
    }

    // ---- constants -----------------------------------------------------

    fn parse_constant(&mut self) -> Option<()> {
        let docs = self.take_docs();
        self.expect(TokenKind::Const)?;
        self.consume();
        self.expect_msg(TokenKind::Blank, "missing blanks after const declaration")?;
        self.skip_blanks();
        self.expect(TokenKind::Identifier)?;
        let name = self.current_value();
        self.consume_and_skip_blanks();
        self.expect(TokenKind::Colon)?;
        self.consume_and_skip_blanks();
        let type_token = self.current();
        let ty = self.parse_builtin_or_resolve_type()?;
        if !matches!(self.store.get(ty), Type::Builtin(_)) {
            self.report_token(type_token, "constant can only be of builtin type");
            return None;
        }
        self.skip_blanks();
        self.expect(TokenKind::Equality)?;
        self.consume_and_skip_blanks();
        let value = self.parse_unsigned()?;
        self.skip_blanks();
        self.expect(TokenKind::SemiColon)?;
        self.consume();
        self.ast_mut().constants.push(Constant {
            name,
            value,
            ty,
            doc: docs,
        });
        self.clear_unused_docs();
        Some(())
    }

    // ---- functions -----------------------------------------------------

    fn parse_function(&mut self, self_allowed: bool) -> Option<Function> {
        let docs = self.take_docs();
        self.expect(TokenKind::Fn)?;
        self.consume();
        self.expect_msg(TokenKind::Blank, "missing blanks after fn declaration")?;
        self.skip_blanks();
        self.expect(TokenKind::Identifier)?;
        let name = self.current_value();
        self.consume();

        let mut func = FunctionType {
            self_arg: None,
            args: Vec::new(),
            ret: None,
        };
        let mut self_allowed = self_allowed;
        self.parse_list(
            TokenKind::LParen,
            TokenKind::Comma,
            TokenKind::RParen,
            |p| {
                if self_allowed {
                    if p.kind() == TokenKind::Ampersand {
                        p.consume_and_skip_blanks();
                        let mut is_mut = false;
                        if p.kind() == TokenKind::Mut {
                            is_mut = true;
                            p.consume();
                            p.expect_msg(TokenKind::Blank, "expected blanks before 'self'")?;
                            p.skip_blanks();
                        }
                        if p.kind() == TokenKind::SelfKw {
                            func.self_arg = Some(if is_mut {
                                SelfArgument::MutReference
                            } else {
                                SelfArgument::Reference
                            });
                            p.consume();
                            self_allowed = false;
                            return Some(());
                        }
                        return p.report_current("expected 'self'");
                    }
                    if p.kind() == TokenKind::SelfKw {
                        func.self_arg = Some(SelfArgument::Value);
                        p.consume();
                        self_allowed = false;
                        return Some(());
                    }
                }
                p.expect_msg(TokenKind::Identifier, "expected parameter name")?;
                let arg_name = p.current_value();
                p.consume_and_skip_blanks();
                p.expect(TokenKind::Colon)?;
                p.consume_and_skip_blanks();
                let ty = p.parse_type()?;
                func.args.push(Field::new(arg_name, ty));
                self_allowed = false;
                Some(())
            },
        )?;
        self.skip_blanks();
        if self.kind() == TokenKind::RightArrow {
            self.consume_and_skip_blanks();
            func.ret = Some(self.parse_type()?);
        }
        let ty = self.store.add(Type::Function(func));
        self.ast_mut().add_type(ty);
        Some(Function {
            name,
            ty,
            doc: docs,
        })
    }

    fn parse_impl_block(&mut self) -> Option<()> {
        self.skip_comments_and_space()?;
        self.expect(TokenKind::Impl)?;
        self.consume_and_skip_blanks();
        let type_name_token = self.current();
        self.expect_msg(TokenKind::Identifier, "expected type name")?;
        let name = self.current_value();
        self.consume_and_skip_blanks();
        self.clear_unused_docs();
        let mut block = ImplBlock {
            name: name.clone(),
            functions: Vec::new(),
        };
        self.parse_list(TokenKind::LBrace, TokenKind::Eol, TokenKind::RBrace, |p| {
            let func = p.parse_function(true)?;
            block.functions.push(func);
            p.clear_unused_docs();
            Some(())
        })?;
        if self.ast_mut().find_type_with_name(&name).is_none() {
            let msg = format!("no type with name {name}");
            self.report_token(type_name_token, msg);
            return None;
        }
        self.ast_mut().add_impl_block(block);
        self.clear_unused_docs();
        Some(())
    }

    // ---- type syntax ---------------------------------------------------

    fn parse_type(&mut self) -> Option<TypeId> {
        self.skip_comments_and_space()?;
        match self.kind() {
            TokenKind::Star => self.parse_pointer_type(),
            TokenKind::Ampersand => {
                if self.next_is(TokenKind::UpperFn) {
                    self.parse_function_pointer()
                } else if self.next_is(TokenKind::LBracket) {
                    self.parse_dyn_array_type()
                } else {
                    self.parse_reference_type()
                }
            }
            TokenKind::LBracket => self.parse_array_type(),
            TokenKind::Identifier => self.parse_builtin_or_resolve_type(),
            _ => {
                self.report_current("error parsing type")?;
                None
            }
        }
    }

    fn parse_pointer_type(&mut self) -> Option<TypeId> {
        self.expect(TokenKind::Star)?;
        self.consume();
        let is_mutable = match self.kind() {
            TokenKind::Mut => true,
            TokenKind::Const => false,
            _ => return self.report_current("expected 'mut' or 'const'").map(|_| TypeId(0)),
        };
        self.consume_and_skip_blanks();
        self.skip_comments_and_space()?;
        let pointee = if self.kind() == TokenKind::Star {
            self.parse_pointer_type()?
        } else {
            self.parse_builtin_or_resolve_type()?
        };
        let id = self.store.add(Type::Reference {
            kind: ReferenceKind::Pointer,
            is_mutable,
            pointee,
        });
        self.ast_mut().add_type(id);
        Some(id)
    }

    fn parse_reference_type(&mut self) -> Option<TypeId> {
        self.expect(TokenKind::Ampersand)?;
        self.consume();
        let is_mutable = if self.kind() == TokenKind::Mut {
            self.consume();
            self.expect_msg(TokenKind::Blank, "missing blanks after mut keyword")?;
            true
        } else {
            false
        };
        self.skip_blanks();
        let pointee = match self.kind() {
            TokenKind::LBracket => self.parse_array_type()?,
            TokenKind::Identifier => self.parse_builtin_or_resolve_type()?,
            _ => return self.report_current("expected identifier or '['").map(|_| TypeId(0)),
        };
        let id = self.store.add(Type::Reference {
            kind: ReferenceKind::Reference,
            is_mutable,
            pointee,
        });
        self.ast_mut().add_type(id);
        Some(id)
    }

    fn parse_function_pointer(&mut self) -> Option<TypeId> {
        self.expect(TokenKind::Ampersand)?;
        self.consume();
        self.expect(TokenKind::UpperFn)?;
        self.consume();
        let mut func = FunctionType {
            self_arg: None,
            args: Vec::new(),
            ret: None,
        };
        self.parse_list(
            TokenKind::LParen,
            TokenKind::Comma,
            TokenKind::RParen,
            |p| {
                let ty = p.parse_type()?;
                func.args.push(Field::new("", ty));
                Some(())
            },
        )?;
        self.skip_blanks();
        if self.kind() == TokenKind::RightArrow {
            self.consume_and_skip_blanks();
            func.ret = Some(self.parse_type()?);
        }
        let id = self.store.add(Type::Function(func));
        self.ast_mut().add_type(id);
        Some(id)
    }

    /// `&[T]` or `&[T; max]`.
    fn parse_dyn_array_type(&mut self) -> Option<TypeId> {
        self.expect(TokenKind::Ampersand)?;
        self.consume();
        self.expect(TokenKind::LBracket)?;
        self.consume_and_skip_blanks();
        let element = self.parse_type()?;
        self.skip_blanks();
        let max_size = if self.kind() == TokenKind::SemiColon {
            self.consume_and_skip_blanks();
            let n = self.parse_unsigned()?;
            self.skip_blanks();
            n
        } else {
            DEFAULT_DYN_ARRAY_MAX
        };
        self.expect(TokenKind::RBracket)?;
        self.consume();
        let module = self.module();
        let id = self.store.add(Type::DynArray {
            max_size,
            element,
            module,
        });
        self.ast_mut().add_type(id);
        Some(id)
    }

    fn parse_array_type(&mut self) -> Option<TypeId> {
        self.skip_comments_and_space()?;
        self.expect(TokenKind::LBracket)?;
        self.consume_and_skip_blanks();
        let element = self.parse_type()?;
        self.skip_blanks();
        self.expect(TokenKind::SemiColon)?;
        self.consume_and_skip_blanks();
        self.expect_msg(TokenKind::Number, "expected array size")?;
        let len = self.parse_unsigned()?;
        self.skip_blanks();
        self.expect(TokenKind::RBracket)?;
        self.consume();
        let id = self.store.add(Type::Array { len, element });
        self.ast_mut().add_type(id);
        Some(id)
    }

    fn parse_builtin_or_resolve_type(&mut self) -> Option<TypeId> {
        self.expect(TokenKind::Identifier)?;
        let name = self.current_value();
        if let Some(id) = self.store.builtin_by_name(&name) {
            self.consume();
            return Some(id);
        }
        if let Some((_, id)) = self
            .generic_params
            .iter()
            .find(|(n, _)| *n == name)
            .cloned()
        {
            self.consume();
            return Some(id);
        }
        let Some(base) = self.ast_mut().find_type_with_name(&name) else {
            let msg = format!("no type with name {name}");
            return self.report_current(msg).map(|_| TypeId(0));
        };
        self.consume();
        if self.kind() != TokenKind::LessThen {
            return Some(base);
        }
        self.parse_generic_instantiation(base, &name)
    }

    fn parse_generic_instantiation(&mut self, base: TypeId, name: &str) -> Option<TypeId> {
        let open_token = self.current();
        let mut substitutions = Vec::new();
        self.parse_list(
            TokenKind::LessThen,
            TokenKind::Comma,
            TokenKind::MoreThen,
            |p| {
                substitutions.push(p.parse_type()?);
                Some(())
            },
        )?;
        // Imported generics cannot be expanded until the linker fills their
        // links; the instantiation is recorded with the body left pending.
        let pending = match self.store.get(base) {
            Type::Generic {
                parameters, body, ..
            } => {
                let (parameters, body) = (parameters.clone(), *body);
                if parameters.len() != substitutions.len() {
                    let msg = format!(
                        "type {name} expects {} generic parameters, got {}",
                        parameters.len(),
                        substitutions.len()
                    );
                    self.report_token(open_token, msg);
                    return None;
                }
                Some((parameters, body))
            }
            Type::Imported { .. } => None,
            _ => {
                let msg = format!("type {name} is not generic");
                self.report_token(open_token, msg);
                return None;
            }
        };

        // Reuse a previous instantiation with the same substitutions.
        let existing = self
            .ast
            .as_ref()
            .expect("ast created")
            .generic_instantiations
            .iter()
            .copied()
            .find(|id| match self.store.get(*id) {
                Type::GenericInstantiation {
                    generic,
                    substitutions: subs,
                    ..
                } => *generic == base && *subs == substitutions,
                _ => false,
            });
        if let Some(id) = existing {
            return Some(id);
        }

        let instantiated = match pending {
            Some((parameters, body)) => {
                self.store
                    .clone_and_substitute(body, &parameters, &substitutions)
            }
            // Placeholder until the linker resolves the imported generic.
            None => base,
        };
        let module = self.module();
        let id = self.store.add(Type::GenericInstantiation {
            generic: base,
            generic_name: name.to_string(),
            module,
            substitutions,
            instantiated,
        });
        let ast = self.ast_mut();
        ast.add_type(id);
        ast.add_generic_instantiation(id);
        Some(id)
    }

    // ---- fields --------------------------------------------------------

    fn parse_field(&mut self) -> Option<Field> {
        let docs = self.take_docs();
        self.expect_msg(TokenKind::Identifier, "expected identifier")?;
        let name = self.current_value();
        self.consume_and_skip_blanks();
        self.expect(TokenKind::Colon)?;
        self.consume_and_skip_blanks();
        let ty = self.parse_type()?;
        Some(Field {
            name,
            ty,
            doc: docs,
        })
    }

    // ---- named type declarations ---------------------------------------

    /// Common prelude of `struct`/`enum`/`variant`: keyword, name, optional
    /// generic parameter list when allowed. Returns (docs, name).
    fn parse_tag_head(
        &mut self,
        start: TokenKind,
        generics_allowed: bool,
    ) -> Option<(Option<DocBlock>, String, Vec<TypeId>)> {
        self.skip_comments_and_space()?;
        let docs = self.take_docs();
        self.expect(start)?;
        self.consume();
        self.skip_comments_and_space()?;
        self.expect(TokenKind::Identifier)?;
        let name = self.current_value();
        self.consume_and_skip_blanks();

        let mut params = Vec::new();
        if self.kind() == TokenKind::LessThen {
            if !generics_allowed {
                self.report_current("this declaration cannot be generic")?;
            }
            self.parse_list(
                TokenKind::LessThen,
                TokenKind::Comma,
                TokenKind::MoreThen,
                |p| {
                    p.expect_msg(TokenKind::Identifier, "expected generic parameter name")?;
                    let pname = p.current_value();
                    let id = p.store.add(Type::GenericParameter {
                        name: pname.clone(),
                    });
                    p.generic_params.push((pname, id));
                    params.push(id);
                    p.consume();
                    Some(())
                },
            )?;
            self.skip_blanks();
        }
        Some((docs, name, params))
    }

    fn finish_named_type(
        &mut self,
        name: &str,
        docs: Option<DocBlock>,
        params: Vec<TypeId>,
        body: TypeId,
    ) -> Option<()> {
        self.generic_params.clear();
        let id = if params.is_empty() {
            body
        } else {
            let module = self.module();
            self.store.add(Type::Generic {
                name: name.to_string(),
                module,
                parameters: params,
                body,
            })
        };
        if !self.ast_mut().add_top_level_type(name, id) {
            let msg = format!("duplicate top level name {name}");
            return self.report_current(msg);
        }
        if let Some(doc) = docs {
            self.ast_mut().set_type_doc(id, doc);
        }
        self.clear_unused_docs();
        Some(())
    }

    fn parse_struct(&mut self) -> Option<()> {
        let (docs, name, params) = self.parse_tag_head(TokenKind::Struct, true)?;
        let mut fields = Vec::new();
        self.parse_brace_list(|p| {
            let field = p.parse_field()?;
            fields.push(field);
            Some(())
        })?;
        for i in 1..fields.len() {
            if fields[..i].iter().any(|f: &Field| f.name == fields[i].name) {
                let msg = format!("duplicate field name {}", fields[i].name);
                return self.report_current(msg);
            }
        }
        let module = self.module();
        let body = self.store.add(Type::Struct {
            name: name.clone(),
            module,
            fields,
        });
        self.finish_named_type(&name, docs, params, body)
    }

    fn parse_enum(&mut self) -> Option<()> {
        let (docs, name, params) = self.parse_tag_head(TokenKind::Enum, false)?;
        let mut constants: Vec<crate::types::EnumConstant> = Vec::new();
        self.parse_brace_list(|p| {
            p.skip_comments_and_space()?;
            let cdocs = p.take_docs();
            p.expect(TokenKind::Identifier)?;
            let cname = p.current_value();
            p.consume_and_skip_blanks();
            if p.kind() != TokenKind::Equality {
                return p.report_current("expected '='");
            }
            p.consume_and_skip_blanks();
            let value = p.parse_signed()?;
            if constants.iter().any(|c| c.value == value) {
                return p.report_current("enum constant redefinition");
            }
            constants.push(crate::types::EnumConstant {
                name: cname,
                value,
                is_user_set: true,
                doc: cdocs,
            });
            Some(())
        })?;
        let module = self.module();
        let body = self.store.add(Type::Enum {
            name: name.clone(),
            module,
            constants,
        });
        self.finish_named_type(&name, docs, params, body)
    }

    fn parse_variant(&mut self) -> Option<()> {
        let (docs, name, params) = self.parse_tag_head(TokenKind::Variant, true)?;
        let mut fields = Vec::new();
        self.parse_brace_list(|p| {
            p.skip_comments_and_space()?;
            let fdocs = p.take_docs();
            p.expect(TokenKind::Identifier)?;
            let fname = p.current_value();
            p.consume_and_skip_blanks();
            match p.kind() {
                TokenKind::Comma | TokenKind::RBrace => {
                    fields.push(VariantField::Constant {
                        name: fname,
                        doc: fdocs,
                    });
                }
                TokenKind::LBrace => {
                    let mut inner = Vec::new();
                    p.parse_brace_list(|q| {
                        let field = q.parse_field()?;
                        inner.push(field);
                        Some(())
                    })?;
                    fields.push(VariantField::Struct {
                        name: fname,
                        fields: inner,
                        doc: fdocs,
                    });
                }
                TokenKind::LParen => {
                    let mut inner = Vec::new();
                    p.parse_list(
                        TokenKind::LParen,
                        TokenKind::Comma,
                        TokenKind::RParen,
                        |q| {
                            q.skip_blanks();
                            inner.push(q.parse_type()?);
                            Some(())
                        },
                    )?;
                    fields.push(VariantField::Tuple {
                        name: fname,
                        types: inner,
                        doc: fdocs,
                    });
                }
                _ => return p.report_current("expected ',' or '{' or '('"),
            }
            p.clear_unused_docs();
            Some(())
        })?;
        let module = self.module();
        let body = self.store.add(Type::Variant {
            name: name.clone(),
            module,
            fields,
        });
        self.finish_named_type(&name, docs, params, body)
    }

    fn parse_alias(&mut self) -> Option<()> {
        self.skip_comments_and_space()?;
        let docs = self.take_docs();
        self.expect(TokenKind::Type)?;
        self.consume();
        self.expect_msg(TokenKind::Blank, "missing blanks after type keyword")?;
        self.skip_blanks();
        self.expect(TokenKind::Identifier)?;
        let name = self.current_value();
        self.consume_and_skip_blanks();
        self.expect(TokenKind::Equality)?;
        self.consume_and_skip_blanks();
        let referent = self.parse_type()?;
        let module = self.module();
        let id = self.store.add(Type::Alias {
            name: name.clone(),
            module,
            referent,
        });
        self.skip_blanks();
        self.expect(TokenKind::SemiColon)?;
        self.consume();
        self.finish_named_type(&name, docs, Vec::new(), id)
    }

    // ---- component -----------------------------------------------------

    fn parse_component(&mut self) -> Option<()> {
        self.expect(TokenKind::Component)?;
        if self.ast.as_ref().is_some_and(|a| a.component.is_some()) {
            return self.report_current("only one component declaration is allowed");
        }
        let mut comp = Component::new(self.module());
        self.consume_and_skip_blanks();
        self.expect(TokenKind::LBrace)?;
        self.consume();

        loop {
            self.skip_comments_and_space()?;
            match self.kind() {
                TokenKind::Parameters => self.parse_parameters(&mut comp)?,
                TokenKind::Commands => self.parse_commands(&mut comp)?,
                TokenKind::Statuses => self.parse_statuses(&mut comp)?,
                TokenKind::Impl => self.parse_component_impl(&mut comp)?,
                // Contextual keyword: `events` is not reserved outside
                // component bodies.
                TokenKind::Identifier if self.current_value() == "events" => {
                    self.parse_events(&mut comp)?
                }
                TokenKind::RBrace => {
                    self.consume();
                    break;
                }
                _ => return self.report_current("invalid component level token"),
            }
        }
        self.ast_mut().component = Some(comp);
        Some(())
    }

    fn parse_parameters(&mut self, comp: &mut Component) -> Option<()> {
        if comp.has_params() {
            return self.report_current("component can have only one parameters declaration");
        }
        self.expect(TokenKind::Parameters)?;
        self.consume_and_skip_blanks();
        self.parse_list(TokenKind::LBrace, TokenKind::Comma, TokenKind::RBrace, |p| {
            let field = p.parse_field()?;
            comp.params.push(field);
            p.clear_unused_docs();
            Some(())
        })?;
        self.clear_unused_docs();
        Some(())
    }

    fn parse_commands(&mut self, comp: &mut Component) -> Option<()> {
        if comp.has_cmds() {
            return self.report_current("component can have only one commands declaration");
        }
        self.expect(TokenKind::Commands)?;
        self.consume_and_skip_blanks();
        self.parse_list(TokenKind::LBrace, TokenKind::Eol, TokenKind::RBrace, |p| {
            let func = p.parse_function(false)?;
            comp.cmds.push(func);
            p.clear_unused_docs();
            Some(())
        })?;
        self.clear_unused_docs();
        Some(())
    }

    fn parse_component_impl(&mut self, comp: &mut Component) -> Option<()> {
        if comp.impl_block.is_some() {
            return self.report_current("component can have only one impl declaration");
        }
        self.expect(TokenKind::Impl)?;
        self.consume_and_skip_blanks();
        let mut block = ImplBlock::default();
        self.parse_list(TokenKind::LBrace, TokenKind::Eol, TokenKind::RBrace, |p| {
            let func = p.parse_function(false)?;
            block.functions.push(func);
            p.clear_unused_docs();
            Some(())
        })?;
        comp.impl_block = Some(block);
        self.clear_unused_docs();
        Some(())
    }

    fn parse_events(&mut self, comp: &mut Component) -> Option<()> {
        if comp.has_events() {
            return self.report_current("component can have only one events declaration");
        }
        self.consume_and_skip_blanks();
        self.parse_list(TokenKind::LBrace, TokenKind::Comma, TokenKind::RBrace, |p| {
            p.parse_event_entry(comp)
        })?;
        self.clear_unused_docs();
        Some(())
    }

    /// `[id, enabled]: name(field: type, ...)`
    fn parse_event_entry(&mut self, comp: &mut Component) -> Option<()> {
        self.expect(TokenKind::LBracket)?;
        self.consume_and_skip_blanks();
        let num_token = self.current();
        let number = self.parse_unsigned()?;
        self.skip_blanks();
        self.expect(TokenKind::Comma)?;
        self.consume_and_skip_blanks();
        self.expect(TokenKind::Identifier)?;
        let is_enabled = match self.current_value().as_str() {
            "true" => true,
            "false" => false,
            _ => return self.report_current("expected 'true' or 'false'"),
        };
        self.consume_and_skip_blanks();
        self.expect(TokenKind::RBracket)?;
        self.consume_and_skip_blanks();
        self.expect(TokenKind::Colon)?;
        self.consume_and_skip_blanks();
        self.expect_msg(TokenKind::Identifier, "expected event name")?;
        let name = self.current_value();

        if comp.events.iter().any(|e| e.number == number) {
            let msg = format!("event with id {number} already defined");
            self.report_token(num_token, msg);
            return None;
        }
        if comp.events.iter().any(|e| e.name == name) {
            let msg = format!("event with name {name} already defined");
            return self.report_current(msg);
        }
        self.consume();

        let mut fields = Vec::new();
        self.parse_list(
            TokenKind::LParen,
            TokenKind::Comma,
            TokenKind::RParen,
            |p| {
                let field = p.parse_field()?;
                fields.push(field);
                Some(())
            },
        )?;
        comp.events.push(crate::ast::EventMsg {
            name,
            number,
            is_enabled,
            fields,
        });
        Some(())
    }

    fn parse_statuses(&mut self, comp: &mut Component) -> Option<()> {
        if comp.has_statuses() {
            return self.report_current("component can have only one statuses declaration");
        }
        self.expect(TokenKind::Statuses)?;
        self.consume_and_skip_blanks();
        self.parse_list(TokenKind::LBrace, TokenKind::Comma, TokenKind::RBrace, |p| {
            p.parse_status_entry(comp)
        })?;
        self.clear_unused_docs();
        Some(())
    }

    fn parse_status_entry(&mut self, comp: &mut Component) -> Option<()> {
        self.expect(TokenKind::LBracket)?;
        self.consume_and_skip_blanks();
        let num_token = self.current();
        let number = self.parse_unsigned()?;
        self.skip_blanks();
        self.expect(TokenKind::Comma)?;
        self.consume_and_skip_blanks();
        let priority = self.parse_unsigned()?;
        self.skip_blanks();
        self.expect(TokenKind::Comma)?;
        self.consume_and_skip_blanks();
        self.expect(TokenKind::Identifier)?;
        let is_enabled = match self.current_value().as_str() {
            "true" => true,
            "false" => false,
            _ => return self.report_current("expected 'true' or 'false'"),
        };
        self.consume_and_skip_blanks();
        self.expect(TokenKind::RBracket)?;

        if comp.statuses.iter().any(|m| m.number == number) {
            let msg = format!("status with id {number} already defined");
            self.report_token(num_token, msg);
            return None;
        }
        let mut msg = StatusMsg {
            number,
            priority,
            is_enabled,
            parts: Vec::new(),
        };

        self.consume_and_skip_blanks();
        self.expect(TokenKind::Colon)?;
        self.consume_and_skip_blanks();
        match self.kind() {
            TokenKind::LBrace => {
                self.parse_list(
                    TokenKind::LBrace,
                    TokenKind::Comma,
                    TokenKind::RBrace,
                    |p| p.parse_status_regexp(&mut msg),
                )?;
            }
            TokenKind::Identifier => {
                self.parse_status_regexp(&mut msg)?;
            }
            _ => {
                return self
                    .report_current("regular expression must begin with an identifier");
            }
        }
        comp.statuses.push(msg);
        Some(())
    }

    fn parse_status_regexp(&mut self, msg: &mut StatusMsg) -> Option<()> {
        self.expect_msg(
            TokenKind::Identifier,
            "regular expression must begin with an identifier",
        )?;
        let mut re = StatusRegexp::default();
        loop {
            match self.kind() {
                TokenKind::Identifier => {
                    re.accessors.push(Accessor::Field {
                        name: self.current_value(),
                        field_ty: None,
                    });
                    self.consume_and_skip_blanks();
                }
                TokenKind::LBracket => {
                    self.consume();
                    let sub = if self.kind() == TokenKind::Number
                        && self.next_is(TokenKind::RBracket)
                    {
                        Subscript::Index(self.parse_unsigned()?)
                    } else {
                        let lower = if self.kind() == TokenKind::Number {
                            Some(self.parse_unsigned()?)
                        } else {
                            None
                        };
                        self.expect(TokenKind::DoubleDot)?;
                        self.consume();
                        let upper = if self.kind() == TokenKind::Number {
                            Some(self.parse_unsigned()?)
                        } else {
                            None
                        };
                        Subscript::Range { lower, upper }
                    };
                    self.expect(TokenKind::RBracket)?;
                    self.consume_and_skip_blanks();
                    re.accessors.push(Accessor::Subscript {
                        sub,
                        container_ty: None,
                    });
                }
                _ => {}
            }
            self.skip_comments_and_space()?;
            match self.kind() {
                TokenKind::Comma | TokenKind::RBrace => break,
                TokenKind::Dot => self.consume(),
                TokenKind::LBracket => {}
                _ => return self.report_current("unexpected token in status path"),
            }
        }
        if re.has_accessors() {
            msg.parts.push(re);
        }
        Some(())
    }
}
