//! # photongen
//!
//! Source generator for the decode interface description language used to
//! describe on-board telemetry and command interfaces of embedded devices.
//!
//! Given a TOML project description plus a set of `.decode` modules,
//! photongen produces:
//!
//! - **Onboard C** - typed message serializers/deserializers, command
//!   dispatch, status report encoders, per-device aggregator headers
//! - **Ground control C++** - mirrored type headers, status message
//!   structs, and a runtime validator for the on-board interface
//!
//! ## Pipeline
//!
//! ```text
//! .decode files -> lexer -> parser -> package linker -> project loader
//!                                                          |
//!                       filesystem tree  <-  generator  <--+
//! ```
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,no_run
//! use std::path::Path;
//! use photongen::config::Config;
//! use photongen::diag::Diagnostics;
//! use photongen::project::Project;
//!
//! let mut diag = Diagnostics::new();
//! let project = Project::from_file(Config::new(), &mut diag, Path::new("project.toml"))
//!     .expect("invalid project");
//! photongen::generator::generate(&project, Path::new("out")).expect("generation failed");
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! photongen -p project.toml -o out        # generate everything
//! photongen -p project.toml -o out -d 3   # with runtime size-check logging
//! ```

/// Source buffers, locations and structured diagnostic reports.
pub mod diag;

/// Tokenizer for the IDL surface.
pub mod lexer;

/// The type graph: arena, handles, equality, resolution, substitution.
pub mod types;

/// Per-file AST and component model.
pub mod ast;

/// Recursive descent parser producing one [`ast::Ast`] per file.
pub mod parser;

/// Package linking: imports, component registration, status paths.
pub mod package;

/// TOML project description and device topology.
pub mod project;

/// Generation options (debug/compression levels, target options).
pub mod config;

/// The wire format as an executable value codec.
pub mod wire;

/// Code generation and output materialization.
pub mod generator;

/// Command-line argument parsing.
pub mod args;
