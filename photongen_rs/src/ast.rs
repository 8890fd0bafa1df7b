//! Per-file AST: module identity, declarations, components and status
//! accessor paths.
//!
//! An [`Ast`] owns everything a single `.decode` file declares. Types
//! themselves live in the shared [`TypeStore`](crate::types::TypeStore); the
//! AST records which `TypeId`s belong to the module and how they are named.
//! After parsing, the only mutations are performed by the package linker:
//! component numbering, import links and status accessor binding.

use std::collections::HashMap;
use std::sync::Arc;

use crate::diag::FileInfo;
use crate::types::{Field, TypeId};

/// Documentation attached to a declaration, assembled from a run of `///`
/// comments.
#[derive(Clone, Debug)]
pub struct DocBlock {
    lines: Vec<String>,
}

impl DocBlock {
    pub fn new(lines: Vec<String>) -> Self {
        DocBlock { lines }
    }

    /// First line of the comment run.
    pub fn short_description(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or("")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// A module name paired with the file that declared it.
#[derive(Debug)]
pub struct ModuleInfo {
    name: String,
    file: Arc<FileInfo>,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, file: Arc<FileInfo>) -> Arc<Self> {
        Arc::new(ModuleInfo {
            name: name.into(),
            file,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &Arc<FileInfo> {
        &self.file
    }
}

/// `import mod::{A, B}` - one declaration per import path.
#[derive(Debug)]
pub struct ImportDecl {
    pub path: String,
    /// `Type::Imported` stubs created for each imported name.
    pub types: Vec<TypeId>,
}

/// A named function: command, impl-block entry.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Always a `Type::Function`.
    pub ty: TypeId,
    pub doc: Option<DocBlock>,
}

/// `impl Name { fn ... }` bound to a named type (or a component) at link
/// time.
#[derive(Debug, Default)]
pub struct ImplBlock {
    pub name: String,
    pub functions: Vec<Function>,
}

/// `const NAME: type = value;`
#[derive(Debug)]
pub struct Constant {
    pub name: String,
    pub value: u64,
    pub ty: TypeId,
    pub doc: Option<DocBlock>,
}

/// Subscript payload of a status accessor: a single index or a
/// `[lower..upper]` range with optional bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subscript {
    Index(u64),
    Range {
        lower: Option<u64>,
        upper: Option<u64>,
    },
}

/// One step of a status accessor path. Back references (`field_ty`,
/// `container_ty`) are filled by the linker.
#[derive(Clone, Debug)]
pub enum Accessor {
    Field {
        name: String,
        /// Type of the named field, bound at link time.
        field_ty: Option<TypeId>,
    },
    Subscript {
        sub: Subscript,
        /// Container type the subscript applies to, bound at link time.
        container_ty: Option<TypeId>,
    },
}

/// An accessor path over a component's parameters selecting one telemetry
/// value.
#[derive(Clone, Debug, Default)]
pub struct StatusRegexp {
    pub accessors: Vec<Accessor>,
    /// Terminal type of the path, bound at link time.
    pub ty: Option<TypeId>,
}

impl StatusRegexp {
    pub fn has_accessors(&self) -> bool {
        !self.accessors.is_empty()
    }

    /// Joined field names, used for ground control message field naming.
    pub fn field_name(&self) -> String {
        let mut out = String::new();
        for acc in &self.accessors {
            if let Accessor::Field { name, .. } = acc {
                if out.is_empty() {
                    out.push_str(name);
                } else {
                    out.push('_');
                    out.push_str(name);
                }
            }
        }
        out
    }
}

/// A telemetry message: numbered, prioritized, optionally disabled, carrying
/// one or more accessor paths.
#[derive(Debug)]
pub struct StatusMsg {
    pub number: u64,
    pub priority: u64,
    pub is_enabled: bool,
    pub parts: Vec<StatusRegexp>,
}

impl StatusMsg {
    /// Symbol-friendly name. The grammar carries no explicit name, so it is
    /// derived from the message number.
    pub fn name(&self) -> String {
        format!("msg{}", self.number)
    }
}

/// A named event emitted by a component, carrying an ad-hoc field list.
#[derive(Debug)]
pub struct EventMsg {
    pub name: String,
    pub number: u64,
    pub is_enabled: bool,
    pub fields: Vec<Field>,
}

/// On-board unit of functionality: state fields, commands and telemetry
/// messages. At most one per module.
#[derive(Debug)]
pub struct Component {
    /// Assigned by the package at registration.
    pub number: usize,
    pub module: Arc<ModuleInfo>,
    pub params: Vec<Field>,
    pub cmds: Vec<Function>,
    pub statuses: Vec<StatusMsg>,
    pub events: Vec<EventMsg>,
    pub impl_block: Option<ImplBlock>,
}

impl Component {
    pub fn new(module: Arc<ModuleInfo>) -> Self {
        Component {
            number: 0,
            module,
            params: Vec::new(),
            cmds: Vec::new(),
            statuses: Vec::new(),
            events: Vec::new(),
            impl_block: None,
        }
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn module_name(&self) -> &str {
        self.module.name()
    }

    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn has_cmds(&self) -> bool {
        !self.cmds.is_empty()
    }

    pub fn has_statuses(&self) -> bool {
        !self.statuses.is_empty()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn param_with_name(&self, name: &str) -> Option<&Field> {
        self.params.iter().find(|f| f.name == name)
    }
}

/// The parsed contents of one module file.
#[derive(Debug)]
pub struct Ast {
    module: Arc<ModuleInfo>,
    module_doc: Option<DocBlock>,
    pub imports: Vec<ImportDecl>,
    /// Named top-level types in declaration order.
    named_types: Vec<TypeId>,
    name_to_type: HashMap<String, TypeId>,
    /// Every type node created while parsing this module, named or not.
    pub types: Vec<TypeId>,
    pub constants: Vec<Constant>,
    impl_blocks: HashMap<String, ImplBlock>,
    pub component: Option<Component>,
    /// Unique generic instantiations referenced from this module.
    pub generic_instantiations: Vec<TypeId>,
    /// Doc comments attached to named type declarations.
    type_docs: HashMap<TypeId, DocBlock>,
}

impl Ast {
    pub fn new(module: Arc<ModuleInfo>, module_doc: Option<DocBlock>) -> Self {
        Ast {
            module,
            module_doc,
            imports: Vec::new(),
            named_types: Vec::new(),
            name_to_type: HashMap::new(),
            types: Vec::new(),
            constants: Vec::new(),
            impl_blocks: HashMap::new(),
            component: None,
            generic_instantiations: Vec::new(),
            type_docs: HashMap::new(),
        }
    }

    pub fn module_info(&self) -> &Arc<ModuleInfo> {
        &self.module
    }

    pub fn module_name(&self) -> &str {
        self.module.name()
    }

    pub fn module_doc(&self) -> Option<&DocBlock> {
        self.module_doc.as_ref()
    }

    pub fn file_name(&self) -> &str {
        self.module.file().file_name()
    }

    pub fn named_types(&self) -> &[TypeId] {
        &self.named_types
    }

    pub fn find_type_with_name(&self, name: &str) -> Option<TypeId> {
        self.name_to_type.get(name).copied()
    }

    pub fn find_impl_block_with_name(&self, name: &str) -> Option<&ImplBlock> {
        self.impl_blocks.get(name)
    }

    pub fn add_type(&mut self, id: TypeId) {
        self.types.push(id);
    }

    /// Register a named top-level type. Returns `false` on a name clash.
    pub fn add_top_level_type(&mut self, name: &str, id: TypeId) -> bool {
        if self.name_to_type.contains_key(name) {
            return false;
        }
        self.name_to_type.insert(name.to_string(), id);
        self.named_types.push(id);
        self.types.push(id);
        true
    }

    pub fn add_impl_block(&mut self, block: ImplBlock) {
        self.impl_blocks.insert(block.name.clone(), block);
    }

    pub fn has_constants(&self) -> bool {
        !self.constants.is_empty()
    }

    /// Record a generic instantiation, deduplicated by node id.
    pub fn add_generic_instantiation(&mut self, id: TypeId) {
        if !self.generic_instantiations.contains(&id) {
            self.generic_instantiations.push(id);
        }
    }

    pub fn set_type_doc(&mut self, id: TypeId, doc: DocBlock) {
        self.type_docs.insert(id, doc);
    }

    pub fn type_doc(&self, id: TypeId) -> Option<&DocBlock> {
        self.type_docs.get(&id)
    }
}
