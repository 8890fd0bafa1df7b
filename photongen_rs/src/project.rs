//! Project loading: the TOML project description, module directories and the
//! device topology.
//!
//! A project file names devices and wires them together with telemetry
//! sources and command targets; module directories supply the `.decode` files
//! that make up the package. Loading fails fast on the first structural
//! error; package parsing and linking report through [`Diagnostics`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::ast::Ast;
use crate::config::Config;
use crate::diag::Diagnostics;
use crate::package::Package;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("package contains errors")]
    Package,
    #[error("{0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ProjectError {
    ProjectError::Invalid(msg.into())
}

// ---- TOML surface ------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProjectFile {
    project: ProjectSection,
    #[serde(default)]
    devices: Vec<DeviceSection>,
}

#[derive(Debug, Deserialize)]
struct ProjectSection {
    name: String,
    master: String,
    mcc_id: u64,
    #[serde(default)]
    common_modules: Vec<String>,
    #[serde(default)]
    module_dirs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceSection {
    name: String,
    id: u64,
    #[serde(default)]
    modules: Vec<String>,
    #[serde(default)]
    tm_sources: Vec<String>,
    #[serde(default)]
    cmd_targets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DirFile {
    #[serde(default)]
    modules: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModFile {
    id: u64,
    dest: String,
    decode: String,
    #[serde(default)]
    sources: Vec<String>,
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProjectError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ProjectError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

// ---- resolved model ----------------------------------------------------

/// A runtime endpoint with its module set and telemetry/command topology.
/// Peer devices are referenced by name.
#[derive(Debug)]
pub struct Device {
    pub name: String,
    pub id: u64,
    /// Module names, deduplicated and sorted.
    pub modules: Vec<String>,
    pub tm_sources: Vec<String>,
    pub cmd_targets: Vec<String>,
    pub self_tm_source: bool,
    pub self_cmd_target: bool,
}

/// Extra on-board sources bundled with a module.
#[derive(Debug)]
pub struct ModuleSources {
    pub id: u64,
    pub relative_dest: String,
    pub sources: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct Project {
    name: String,
    mcc_id: u64,
    master: String,
    package: Package,
    devices: Vec<Device>,
    module_sources: HashMap<String, ModuleSources>,
    cfg: Config,
}

impl Project {
    /// Read and validate a project file, loading and linking its package.
    pub fn from_file(
        cfg: Config,
        diag: &mut Diagnostics,
        path: &Path,
    ) -> Result<Project, ProjectError> {
        let project_file: ProjectFile = read_toml(path)?;
        let project_dir = path.parent().unwrap_or(Path::new("."));

        let section = project_file.project;
        let mut device_names = HashSet::new();
        let mut device_ids = HashSet::new();
        for dev in &project_file.devices {
            if dev.id == section.mcc_id {
                return Err(invalid(format!(
                    "device id cannot be the same as mcc_id: {}",
                    dev.id
                )));
            }
            if !device_ids.insert(dev.id) {
                return Err(invalid(format!("found devices with conflicting id {}", dev.id)));
            }
            if !device_names.insert(dev.name.clone()) {
                return Err(invalid(format!(
                    "device with name {} already exists",
                    dev.name
                )));
            }
        }
        if !device_names.contains(&section.master) {
            return Err(invalid(format!(
                "device with name {} marked as master does not exist",
                section.master
            )));
        }

        // Module directories -> decode files + bundled sources.
        let mut module_dirs = section.module_dirs.clone();
        module_dirs.sort();
        module_dirs.dedup();

        let mut decode_files = Vec::new();
        let mut module_sources = HashMap::new();
        for mod_dir in &module_dirs {
            let dir_path = if Path::new(mod_dir).is_absolute() {
                PathBuf::from(mod_dir)
            } else {
                project_dir.join(mod_dir)
            };
            let dir_file: DirFile = read_toml(&dir_path.join("dir.toml"))?;
            let mut module_ids = HashSet::new();
            for module_name in &dir_file.modules {
                let module_dir = dir_path.join(module_name);
                let mod_file: ModFile = read_toml(&module_dir.join("mod.toml"))?;
                if !module_ids.insert(mod_file.id) {
                    return Err(invalid(format!(
                        "found modules with conflicting id {}",
                        mod_file.id
                    )));
                }
                if module_sources.contains_key(module_name) {
                    return Err(invalid(format!(
                        "module with name {module_name} already exists"
                    )));
                }
                decode_files.push(module_dir.join(&mod_file.decode));
                module_sources.insert(
                    module_name.clone(),
                    ModuleSources {
                        id: mod_file.id,
                        relative_dest: mod_file.dest.clone(),
                        sources: mod_file
                            .sources
                            .iter()
                            .map(|s| module_dir.join(s))
                            .collect(),
                    },
                );
            }
        }

        let package =
            Package::read_from_files(diag, &decode_files).ok_or(ProjectError::Package)?;

        for module_name in &section.common_modules {
            if package.module_with_name(module_name).is_none() {
                return Err(invalid(format!(
                    "common module {module_name} does not exist"
                )));
            }
        }

        let mut devices = Vec::new();
        for dev in &project_file.devices {
            let mut modules = section.common_modules.clone();
            for module_name in &dev.modules {
                if package.module_with_name(module_name).is_none() {
                    return Err(invalid(format!("module {module_name} does not exist")));
                }
                modules.push(module_name.clone());
            }
            modules.sort();
            modules.dedup();

            let mut tm_sources = Vec::new();
            let mut self_tm_source = false;
            for peer in &dev.tm_sources {
                if *peer == dev.name {
                    self_tm_source = true;
                    continue;
                }
                if !device_names.contains(peer) {
                    return Err(invalid(format!("unknown tm source: {peer}")));
                }
                tm_sources.push(peer.clone());
            }
            let mut cmd_targets = Vec::new();
            let mut self_cmd_target = false;
            for peer in &dev.cmd_targets {
                if *peer == dev.name {
                    self_cmd_target = true;
                    continue;
                }
                if !device_names.contains(peer) {
                    return Err(invalid(format!("unknown cmd target: {peer}")));
                }
                cmd_targets.push(peer.clone());
            }

            devices.push(Device {
                name: dev.name.clone(),
                id: dev.id,
                modules,
                tm_sources,
                cmd_targets,
                self_tm_source,
                self_cmd_target,
            });
        }

        Ok(Project {
            name: section.name,
            mcc_id: section.mcc_id,
            master: section.master,
            package,
            devices,
            module_sources,
            cfg,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mcc_id(&self) -> u64 {
        self.mcc_id
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device_with_name(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn master(&self) -> &Device {
        self.device_with_name(&self.master)
            .expect("master validated at load time")
    }

    pub fn is_master(&self, device: &Device) -> bool {
        device.name == self.master
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    /// Bundled sources of a module, if any.
    pub fn sources_for_module(&self, ast: &Ast) -> Option<&ModuleSources> {
        self.module_sources.get(ast.module_name())
    }

    /// Module ASTs of a device, in module-name order.
    pub fn device_modules<'a>(&'a self, device: &'a Device) -> impl Iterator<Item = &'a Ast> {
        device
            .modules
            .iter()
            .filter_map(|name| self.package.module_with_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Lay out a minimal project tree on disk:
    /// project.toml + mod/{dir.toml, nav/{mod.toml, nav.decode}}.
    fn write_project(root: &Path, project_toml: &str) {
        fs::write(root.join("project.toml"), project_toml).unwrap();
        let mod_dir = root.join("mod");
        fs::create_dir_all(mod_dir.join("nav")).unwrap();
        fs::write(mod_dir.join("dir.toml"), "modules = [\"nav\"]\n").unwrap();
        fs::write(
            mod_dir.join("nav/mod.toml"),
            "id = 1\ndest = \"modules/nav\"\ndecode = \"nav.decode\"\n",
        )
        .unwrap();
        fs::write(
            mod_dir.join("nav/nav.decode"),
            "module nav\ncomponent { parameters { alt: f64 } statuses { [0, 0, true]: alt } }\n",
        )
        .unwrap();
    }

    const PROJECT: &str = "\
[project]
name = \"demo\"
master = \"mcu\"
mcc_id = 0
common_modules = [\"nav\"]
module_dirs = [\"mod\"]

[[devices]]
name = \"mcu\"
id = 1
tm_sources = [\"mcu\"]
cmd_targets = [\"gc\"]

[[devices]]
name = \"gc\"
id = 2
tm_sources = [\"mcu\"]
cmd_targets = [\"mcu\"]
";

    #[test]
    fn loads_a_valid_project() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(tmp.path(), PROJECT);
        let mut diag = Diagnostics::new();
        let project =
            Project::from_file(Config::new(), &mut diag, &tmp.path().join("project.toml"))
                .expect("project should load");
        assert_eq!(project.name(), "demo");
        assert_eq!(project.mcc_id(), 0);
        assert_eq!(project.devices().len(), 2);
        assert_eq!(project.master().name, "mcu");

        let mcu = project.device_with_name("mcu").unwrap();
        // Common module injected automatically.
        assert_eq!(mcu.modules, vec!["nav".to_string()]);
        assert!(mcu.self_tm_source);
        assert_eq!(mcu.cmd_targets, vec!["gc".to_string()]);

        let nav = project.package().module_with_name("nav").unwrap();
        assert!(project.sources_for_module(nav).is_some());
    }

    #[test]
    fn rejects_mcc_id_collision() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(
            tmp.path(),
            &PROJECT.replace("mcc_id = 0", "mcc_id = 1"),
        );
        let mut diag = Diagnostics::new();
        let err =
            Project::from_file(Config::new(), &mut diag, &tmp.path().join("project.toml"))
                .unwrap_err();
        assert!(err.to_string().contains("mcc_id"));
    }

    #[test]
    fn rejects_duplicate_device_ids_and_unknown_master() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(tmp.path(), &PROJECT.replace("id = 2", "id = 1"));
        let mut diag = Diagnostics::new();
        let err =
            Project::from_file(Config::new(), &mut diag, &tmp.path().join("project.toml"))
                .unwrap_err();
        assert!(err.to_string().contains("conflicting id"));

        let tmp2 = tempfile::tempdir().unwrap();
        write_project(
            tmp2.path(),
            &PROJECT.replace("master = \"mcu\"", "master = \"nope\""),
        );
        let err2 =
            Project::from_file(Config::new(), &mut diag, &tmp2.path().join("project.toml"))
                .unwrap_err();
        assert!(err2.to_string().contains("master"));
    }

    #[test]
    fn rejects_unknown_tm_source() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(
            tmp.path(),
            &PROJECT.replace("tm_sources = [\"mcu\"]\ncmd_targets = [\"gc\"]", "tm_sources = [\"ghost\"]"),
        );
        let mut diag = Diagnostics::new();
        let err =
            Project::from_file(Config::new(), &mut diag, &tmp.path().join("project.toml"))
                .unwrap_err();
        assert!(err.to_string().contains("unknown tm source"));
    }

    #[test]
    fn missing_decode_module_fails_package_phase() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(tmp.path(), PROJECT);
        fs::write(
            tmp.path().join("mod/nav/nav.decode"),
            "module nav\nstruct Broken { a: Missing }\n",
        )
        .unwrap();
        let mut diag = Diagnostics::new();
        let err =
            Project::from_file(Config::new(), &mut diag, &tmp.path().join("project.toml"))
                .unwrap_err();
        assert!(matches!(err, ProjectError::Package));
        assert!(diag.has_errors());
    }
}
