//! Code generation driver and output materialization.
//!
//! Walks the linked project and arranges the generated text into the
//! per-device output layout:
//!
//! ```text
//! <out>/onboard/photon/<mod>/        one .h + one .gen.c per named type
//! <out>/onboard/photon/_dynarray_/   deduplicated dyn array codecs
//! <out>/onboard/photon/_generic_/    generic instantiations
//! <out>/onboard/Photon<Device>.h/.c  per-device aggregators
//! <out>/groundcontrol/photon/        C++ headers, _msgs_, Interface.hpp
//! ```
//!
//! The serialized package blob is rendered on a background thread while the
//! rest of the tree is generated; the materializer joins it before writing
//! `Package.Private.inc.c`.

pub mod blob;
pub mod cmd;
pub mod depends;
pub mod gc;
pub mod inline;
pub mod onboard;
pub mod src_builder;
pub mod status;
pub mod type_def;
pub mod type_name;
pub mod type_repr;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::ast::Ast;
use crate::generator::depends::{Depends, DependsCollector, gen_onboard_includes};
use crate::generator::src_builder::{SrcBuilder, first_upper};
use crate::generator::type_name::type_name;
use crate::project::{Device, Project};
use crate::types::{Type, TypeId, TypeStore};

const BUILTIN_SOURCES: [&str; 4] = [
    "CmdDecoder.Private",
    "CmdEncoder.Private",
    "StatusEncoder.Private",
    "StatusDecoder.Private",
];

pub struct Generator {
    out_path: PathBuf,
}

/// Generate the full output tree for a loaded project.
pub fn generate(project: &Project, out_path: &Path) -> anyhow::Result<()> {
    Generator::new(out_path).generate_project(project)
}

impl Generator {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Generator {
            out_path: out_path.into(),
        }
    }

    pub fn generate_project(&self, project: &Project) -> anyhow::Result<()> {
        let onboard = self.out_path.join("onboard");
        let onboard_photon = onboard.join("photon");
        let gc_root = self.out_path.join("groundcontrol");
        let gc_photon = gc_root.join("photon");
        for dir in [
            &onboard_photon.join("_dynarray_"),
            &onboard_photon.join("_generic_"),
            &gc_photon.join("_generic_"),
            &gc_photon.join("_msgs_"),
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        std::thread::scope(|scope| -> anyhow::Result<()> {
            let blob_task = scope.spawn(|| blob::gen_package_blob(project));

            let package = project.package();
            let store = package.store();
            let ptr_width = project.cfg().pointer_width_bytes();

            for ast in package.modules() {
                self.generate_module(project, ast, &onboard_photon, &gc_photon, ptr_width)?;
            }
            self.generate_dyn_arrays(store, package, &onboard_photon, ptr_width)?;
            self.generate_generics(store, package, &onboard_photon, &gc_photon, ptr_width)?;
            self.generate_config(project, &onboard_photon)?;
            self.generate_tm_and_statuses(project, &onboard_photon, &gc_photon, ptr_width)?;
            self.generate_commands(project, &onboard_photon, ptr_width)?;

            let mut out = SrcBuilder::new();
            gc::gen_gc_interface_header(package, &mut out);
            write_file(&gc_photon.join("Interface.hpp"), out.view())?;

            let bundled = self.copy_bundled_sources(project, &onboard)?;
            self.generate_device_files(project, &onboard, &bundled)?;

            let blob_text = blob_task.join().expect("blob task panicked");
            write_file(&onboard_photon.join("Package.Private.inc.c"), &blob_text)?;
            Ok(())
        })
    }

    fn generate_module(
        &self,
        project: &Project,
        ast: &Ast,
        onboard_photon: &Path,
        gc_photon: &Path,
        ptr_width: u64,
    ) -> anyhow::Result<()> {
        let store = project.package().store();
        let mod_dir = onboard_photon.join(ast.module_name());
        let gc_mod_dir = gc_photon.join(ast.module_name());
        std::fs::create_dir_all(&mod_dir)
            .with_context(|| format!("failed to create {}", mod_dir.display()))?;
        std::fs::create_dir_all(&gc_mod_dir)
            .with_context(|| format!("failed to create {}", gc_mod_dir.display()))?;

        for id in ast.named_types() {
            let ty = store.get(*id);
            if matches!(ty, Type::Imported { .. } | Type::Generic { .. }) {
                continue;
            }
            let name = ty.name().expect("named type").to_string();

            let mut out = SrcBuilder::new();
            onboard::gen_type_header(store, ast, *id, &mut out);
            write_file(&mod_dir.join(format!("{name}.h")), out.view())?;

            let mut out = SrcBuilder::new();
            onboard::gen_type_source(store, *id, ptr_width, &mut out);
            if !out.is_empty() {
                write_file(&mod_dir.join(format!("{name}.gen.c")), out.view())?;
            }

            let mut out = SrcBuilder::new();
            gc::gen_gc_type_header(store, *id, ptr_width, &mut out);
            if !out.is_empty() {
                write_file(&gc_mod_dir.join(format!("{name}.hpp")), out.view())?;
            }
        }

        if let Some(comp) = &ast.component {
            let mut out = SrcBuilder::new();
            onboard::gen_component_header(store, ast, comp, &mut out);
            let base = first_upper(ast.module_name());
            write_file(&mod_dir.join(format!("{base}.Component.h")), out.view())?;

            let mut out = SrcBuilder::new();
            out.append_component_include(ast.module_name(), ".h");
            out.eol();
            if comp.has_params() {
                out.append(format!("Photon{base} _photon{base};\n"));
            }
            write_file(&mod_dir.join(format!("{base}.Component.c")), out.view())?;
        }

        if ast.has_constants() {
            let mut out = SrcBuilder::new();
            out.start_include_guard(ast.module_name(), "CONSTANTS");
            for constant in &ast.constants {
                out.append(format!(
                    "#define PHOTON_{}_{} {}\n",
                    ast.module_name().to_ascii_uppercase(),
                    constant.name,
                    constant.value
                ));
            }
            out.eol();
            out.end_include_guard();
            let base = first_upper(ast.module_name());
            write_file(&mod_dir.join(format!("{base}.Constants.h")), out.view())?;
        }
        Ok(())
    }

    fn generate_dyn_arrays(
        &self,
        store: &TypeStore,
        package: &crate::package::Package,
        onboard_photon: &Path,
        ptr_width: u64,
    ) -> anyhow::Result<()> {
        let dir = onboard_photon.join("_dynarray_");
        for (name, id) in collect_dyn_arrays(store, package) {
            let mut out = SrcBuilder::new();
            onboard::gen_dyn_array_header(store, id, &mut out);
            write_file(&dir.join(format!("{name}.h")), out.view())?;

            let mut out = SrcBuilder::new();
            onboard::gen_dyn_array_source(store, id, ptr_width, &mut out);
            write_file(&dir.join(format!("{name}.gen.c")), out.view())?;
        }
        Ok(())
    }

    fn generate_generics(
        &self,
        store: &TypeStore,
        package: &crate::package::Package,
        onboard_photon: &Path,
        gc_photon: &Path,
        ptr_width: u64,
    ) -> anyhow::Result<()> {
        let onboard_dir = onboard_photon.join("_generic_");
        let gc_dir = gc_photon.join("_generic_");
        for ast in package.modules() {
            for id in &ast.generic_instantiations {
                let name = type_name(store, *id);

                let mut out = SrcBuilder::new();
                onboard::gen_generic_inst_header(store, *id, &mut out);
                write_file(&onboard_dir.join(format!("{name}.h")), out.view())?;

                let mut out = SrcBuilder::new();
                onboard::gen_generic_inst_source(store, *id, ptr_width, &mut out);
                if !out.is_empty() {
                    write_file(&onboard_dir.join(format!("{name}.gen.c")), out.view())?;
                }

                let mut out = SrcBuilder::new();
                gc::gen_gc_generic_inst_header(store, *id, ptr_width, &mut out);
                if !out.is_empty() {
                    write_file(&gc_dir.join(format!("{name}.hpp")), out.view())?;
                }
            }
        }
        Ok(())
    }

    fn generate_config(&self, project: &Project, onboard_photon: &Path) -> anyhow::Result<()> {
        let mut out = SrcBuilder::new();
        out.append_numeric_define("PHOTON_DEBUG_LEVEL", project.cfg().debug_level());
        out.eol();
        out.append_onboard_include("core/Config");
        write_file(&onboard_photon.join("Config.h"), out.view())
    }

    fn generate_tm_and_statuses(
        &self,
        project: &Project,
        onboard_photon: &Path,
        gc_photon: &Path,
        ptr_width: u64,
    ) -> anyhow::Result<()> {
        let package = project.package();
        let store = package.store();
        let messages: Vec<_> = package.status_msgs().collect();

        let mut out = SrcBuilder::new();
        status::gen_tm_private(&messages, &mut out);
        write_file(&onboard_photon.join("Tm.Private.inc.c"), out.view())?;

        let mut out = SrcBuilder::new();
        status::gen_encoder_header(&messages, &mut out);
        write_file(&onboard_photon.join("StatusEncoder.Private.h"), out.view())?;
        let mut out = SrcBuilder::new();
        status::gen_encoder_source(store, &messages, ptr_width, &mut out);
        write_file(&onboard_photon.join("StatusEncoder.Private.c"), out.view())?;

        let mut out = SrcBuilder::new();
        status::gen_decoder_header(&messages, &mut out);
        write_file(&onboard_photon.join("StatusDecoder.Private.h"), out.view())?;
        let mut out = SrcBuilder::new();
        status::gen_decoder_source(store, &messages, ptr_width, &mut out);
        write_file(&onboard_photon.join("StatusDecoder.Private.c"), out.view())?;

        let msgs_dir = gc_photon.join("_msgs_");
        for (comp, msg) in &messages {
            let mut out = SrcBuilder::new();
            gc::gen_gc_msg_header(store, comp, msg, ptr_width, &mut out);
            let file = format!(
                "{}{}.hpp",
                first_upper(comp.name()),
                first_upper(&msg.name())
            );
            write_file(&msgs_dir.join(file), out.view())?;
        }
        Ok(())
    }

    fn generate_commands(
        &self,
        project: &Project,
        onboard_photon: &Path,
        ptr_width: u64,
    ) -> anyhow::Result<()> {
        let package = project.package();
        let store = package.store();
        let comps: Vec<_> = package.components().collect();

        let mut out = SrcBuilder::new();
        cmd::gen_decoder_header(&mut out);
        write_file(&onboard_photon.join("CmdDecoder.Private.h"), out.view())?;
        let mut out = SrcBuilder::new();
        cmd::gen_decoder_source(store, &comps, ptr_width, &mut out);
        write_file(&onboard_photon.join("CmdDecoder.Private.c"), out.view())?;

        let mut out = SrcBuilder::new();
        cmd::gen_encoder_header(store, &comps, &mut out);
        write_file(&onboard_photon.join("CmdEncoder.Private.h"), out.view())?;
        let mut out = SrcBuilder::new();
        cmd::gen_encoder_source(store, &comps, ptr_width, &mut out);
        write_file(&onboard_photon.join("CmdEncoder.Private.c"), out.view())?;
        Ok(())
    }

    /// Copy bundled module sources under their `dest` directories. Returns
    /// per-module relative include paths.
    fn copy_bundled_sources(
        &self,
        project: &Project,
        onboard: &Path,
    ) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
        let mut bundled = BTreeMap::new();
        for ast in project.package().modules() {
            let Some(sources) = project.sources_for_module(ast) else {
                continue;
            };
            let dest_dir = onboard.join(&sources.relative_dest);
            let mut rel_paths = Vec::new();
            for src in &sources.sources {
                let file_name = src
                    .file_name()
                    .and_then(|n| n.to_str())
                    .context("bundled source has no file name")?;
                std::fs::create_dir_all(&dest_dir)
                    .with_context(|| format!("failed to create {}", dest_dir.display()))?;
                std::fs::copy(src, dest_dir.join(file_name)).with_context(|| {
                    format!("failed to copy bundled source {}", src.display())
                })?;
                rel_paths.push(format!("{}/{}", sources.relative_dest, file_name));
            }
            if !rel_paths.is_empty() {
                bundled.insert(ast.module_name().to_string(), rel_paths);
            }
        }
        Ok(bundled)
    }

    fn generate_device_files(
        &self,
        project: &Project,
        onboard: &Path,
        bundled: &BTreeMap<String, Vec<String>>,
    ) -> anyhow::Result<()> {
        for device in project.devices() {
            let base = format!("Photon{}", first_upper(&device.name));
            let mut out = SrcBuilder::new();
            self.gen_device_header(project, device, bundled, &mut out);
            write_file(&onboard.join(format!("{base}.h")), out.view())?;

            let mut out = SrcBuilder::new();
            self.gen_device_source(project, device, bundled, &mut out);
            write_file(&onboard.join(format!("{base}.c")), out.view())?;
        }
        Ok(())
    }

    fn device_deps(&self, project: &Project, device: &Device) -> (Depends, DeviceMods) {
        let package = project.package();
        let collector = DependsCollector::new(package.store());
        let mut deps = Depends::new();
        for ast in project.device_modules(device) {
            collector.collect_ast(ast, &mut deps);
        }

        let mut target_mods = BTreeSet::new();
        let mut target_devices: Vec<&Device> = device
            .cmd_targets
            .iter()
            .filter_map(|n| project.device_with_name(n))
            .collect();
        if device.self_cmd_target {
            target_devices.push(device);
        }
        for dep in &target_devices {
            for ast in project.device_modules(dep) {
                target_mods.insert(ast.module_name().to_string());
                if let Some(comp) = &ast.component {
                    collector.collect_cmds(comp, &mut deps);
                }
            }
        }

        let mut source_mods = BTreeSet::new();
        let mut source_devices: Vec<&Device> = device
            .tm_sources
            .iter()
            .filter_map(|n| project.device_with_name(n))
            .collect();
        if device.self_tm_source {
            source_devices.push(device);
        }
        for dep in &source_devices {
            for ast in project.device_modules(dep) {
                source_mods.insert(ast.module_name().to_string());
                if let Some(comp) = &ast.component {
                    collector.collect_params(comp, &mut deps);
                }
            }
        }

        (
            deps,
            DeviceMods {
                target_mods,
                source_mods,
            },
        )
    }

    fn gen_device_header(
        &self,
        project: &Project,
        device: &Device,
        bundled: &BTreeMap<String, Vec<String>>,
        out: &mut SrcBuilder,
    ) {
        let package = project.package();
        let (deps, mods) = self.device_deps(project, device);

        if project.is_master(device) {
            out.append("#define PHOTON_IS_MASTER\n\n");
        }
        out.append("#define PHOTON_DEVICE_");
        out.append_upper(&device.name);
        out.append("\n\n");
        out.append_numeric_define("PHOTON_DEVICE_ID", device.id);
        for dev in project.devices() {
            out.append(format!(
                "#define PHOTON_DEVICE_ID_{} {}\n",
                dev.name.to_ascii_uppercase(),
                dev.id
            ));
        }
        out.eol();

        for peer in &device.cmd_targets {
            out.append(format!(
                "#define PHOTON_HAS_DEVICE_TARGET_{}\n",
                peer.to_ascii_uppercase()
            ));
        }
        if device.self_cmd_target {
            out.append(format!(
                "#define PHOTON_HAS_DEVICE_TARGET_{}\n",
                device.name.to_ascii_uppercase()
            ));
        }
        for peer in &device.tm_sources {
            out.append(format!(
                "#define PHOTON_HAS_DEVICE_SOURCE_{}\n",
                peer.to_ascii_uppercase()
            ));
        }
        if device.self_tm_source {
            out.append(format!(
                "#define PHOTON_HAS_DEVICE_SOURCE_{}\n",
                device.name.to_ascii_uppercase()
            ));
        }
        for module in &device.modules {
            out.append(format!(
                "#define PHOTON_HAS_MODULE_{}\n",
                module.to_ascii_uppercase()
            ));
        }
        for module in &mods.target_mods {
            out.append(format!(
                "#define PHOTON_HAS_CMD_TARGET_{}\n",
                module.to_ascii_uppercase()
            ));
        }
        for module in &mods.source_mods {
            out.append(format!(
                "#define PHOTON_HAS_TM_SOURCE_{}\n",
                module.to_ascii_uppercase()
            ));
        }
        out.eol();

        out.append("#include \"photon/Config.h\"\n\n");
        gen_onboard_includes(package.store(), &deps, ".h", out);
        out.eol();

        for ast in project.device_modules(device) {
            if ast.component.is_some() {
                out.append_component_include(ast.module_name(), ".h");
            }
        }
        out.eol();

        for builtin in BUILTIN_SOURCES {
            out.append(format!("#include \"photon/{builtin}.h\"\n"));
        }
        out.eol();

        self.append_bundled(device, bundled, ".h", out);
    }

    fn gen_device_source(
        &self,
        project: &Project,
        device: &Device,
        bundled: &BTreeMap<String, Vec<String>>,
        out: &mut SrcBuilder,
    ) {
        let package = project.package();
        let store = package.store();
        let (deps, _) = self.device_deps(project, device);
        // Aliases have headers but no generated sources.
        let src_deps: Depends = deps
            .iter()
            .copied()
            .filter(|t| !matches!(store.get(*t), Type::Alias { .. }))
            .collect();

        out.append(format!(
            "#include \"Photon{}.h\"\n\n",
            first_upper(&device.name)
        ));
        gen_onboard_includes(store, &src_deps, ".gen.c", out);
        out.eol();

        for ast in project.device_modules(device) {
            if ast.component.is_some() {
                out.append_component_include(ast.module_name(), ".c");
            }
        }
        out.eol();

        for builtin in BUILTIN_SOURCES {
            out.append(format!("#include \"photon/{builtin}.c\"\n"));
        }
        out.eol();

        self.append_bundled(device, bundled, ".c", out);
    }

    fn append_bundled(
        &self,
        device: &Device,
        bundled: &BTreeMap<String, Vec<String>>,
        ext: &str,
        out: &mut SrcBuilder,
    ) {
        for module in &device.modules {
            let Some(paths) = bundled.get(module) else {
                continue;
            };
            for path in paths {
                if path.ends_with(ext) {
                    out.append(format!("#include \"{path}\"\n"));
                }
            }
        }
    }
}

struct DeviceMods {
    target_mods: BTreeSet<String>,
    source_mods: BTreeSet<String>,
}

/// All dyn array nodes reachable from the package, keyed (and deduplicated)
/// by mangled name.
fn collect_dyn_arrays(
    store: &TypeStore,
    package: &crate::package::Package,
) -> BTreeMap<String, TypeId> {
    let mut found = BTreeMap::new();
    let mut stack: Vec<TypeId> = Vec::new();
    for ast in package.modules() {
        stack.extend(ast.types.iter().copied());
    }
    let mut seen = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        match store.get(id) {
            Type::DynArray { element, .. } => {
                found.insert(type_name(store, id), id);
                stack.push(*element);
            }
            Type::Reference { pointee, .. } => stack.push(*pointee),
            Type::Array { element, .. } => stack.push(*element),
            Type::Function(func) => {
                stack.extend(func.args.iter().map(|a| a.ty));
                if let Some(ret) = func.ret {
                    stack.push(ret);
                }
            }
            Type::Struct { fields, .. } => stack.extend(fields.iter().map(|f| f.ty)),
            Type::Variant { fields, .. } => {
                for field in fields {
                    match field {
                        crate::types::VariantField::Constant { .. } => {}
                        crate::types::VariantField::Tuple { types, .. } => {
                            stack.extend(types.iter().copied())
                        }
                        crate::types::VariantField::Struct { fields, .. } => {
                            stack.extend(fields.iter().map(|f| f.ty))
                        }
                    }
                }
            }
            Type::Alias { referent, .. } => stack.push(*referent),
            Type::Generic { body, .. } => stack.push(*body),
            Type::GenericInstantiation {
                instantiated,
                substitutions,
                ..
            } => {
                stack.push(*instantiated);
                stack.extend(substitutions.iter().copied());
            }
            _ => {}
        }
    }
    found
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.display()))
}
