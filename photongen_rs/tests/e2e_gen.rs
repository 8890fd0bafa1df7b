//! End to end: project tree on disk -> full generated output layout.

use std::fs;
use std::path::{Path, PathBuf};

use photongen::config::Config;
use photongen::diag::Diagnostics;
use photongen::generator;
use photongen::project::Project;

const PROJECT_TOML: &str = r#"
[project]
name = "demo"
master = "gc"
mcc_id = 0
common_modules = ["core"]
module_dirs = ["modules"]

[[devices]]
name = "mcu"
id = 1
modules = ["nav"]
tm_sources = ["mcu"]
cmd_targets = []

[[devices]]
name = "gc"
id = 2
tm_sources = ["mcu"]
cmd_targets = ["mcu"]
"#;

const CORE_DECODE: &str = "\
module core
/// Shared result code.
enum Error {
    Ok = 0,
    Fail = 1,
}
struct Pair<A, B> {
    first: A,
    second: B,
}
const VERSION: u8 = 3;
";

const NAV_DECODE: &str = "\
module nav
import core::{Error, Pair}

struct LatLon {
    latitude: f64,
    longitude: f64,
}

/// Full position report.
struct Position {
    latLon: LatLon,
    altitude: f64,
}

variant Event {
    Started,
    Moved(f64),
    Stopped { reason: Error },
}

type Route = &[LatLon; 16];

struct State {
    route: Route,
    scaled: Pair<u8, u16>,
}

component {
    parameters {
        pos: Position,
        velocities: [f32; 3],
        state: State
    }
    commands {
        fn setPosition(lat: f64, lon: f64)
        fn getAltitude() -> f64
    }
    statuses {
        [0, 0, true]: { pos.latLon.latitude, pos.latLon.longitude },
        [1, 1, true]: velocities[0..2],
        [2, 0, false]: state.route[..]
    }
}
";

fn write_project(root: &Path) {
    fs::write(root.join("project.toml"), PROJECT_TOML).unwrap();
    for (module, decode, extra_source) in [
        ("core", CORE_DECODE, Some(("CoreHelpers.c", "/* helper */\n"))),
        ("nav", NAV_DECODE, None),
    ] {
        let dir = root.join("modules").join(module);
        fs::create_dir_all(&dir).unwrap();
        let mut mod_toml = format!(
            "id = {}\ndest = \"modules/{module}\"\ndecode = \"{module}.decode\"\n",
            if module == "core" { 1 } else { 2 }
        );
        if let Some((name, contents)) = extra_source {
            fs::write(dir.join(name), contents).unwrap();
            mod_toml.push_str(&format!("sources = [\"{name}\"]\n"));
        }
        fs::write(dir.join("mod.toml"), mod_toml).unwrap();
        fs::write(dir.join(format!("{module}.decode")), decode).unwrap();
    }
    fs::write(
        root.join("modules/dir.toml"),
        "modules = [\"core\", \"nav\"]\n",
    )
    .unwrap();
}

fn generate_into(root: &Path, out: &Path) {
    let mut diag = Diagnostics::new();
    let project = Project::from_file(Config::new(), &mut diag, &root.join("project.toml"))
        .unwrap_or_else(|err| {
            diag.print_reports(false);
            panic!("project load failed: {err}");
        });
    generator::generate(&project, out).expect("generation failed");
    assert!(!diag.has_errors());
}

fn read(path: PathBuf) -> String {
    fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("missing generated file {}", path.display()))
}

#[test]
fn generates_the_documented_output_tree() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path());
    let out = tmp.path().join("out");
    generate_into(tmp.path(), &out);

    let onboard = out.join("onboard");
    let photon = onboard.join("photon");
    let gc = out.join("groundcontrol/photon");

    // Per-module type files.
    for file in [
        "core/Error.h",
        "core/Error.gen.c",
        "core/Core.Constants.h",
        "nav/LatLon.h",
        "nav/LatLon.gen.c",
        "nav/Position.h",
        "nav/Event.h",
        "nav/Event.gen.c",
        "nav/Route.h",
        "nav/State.h",
        "nav/Nav.Component.h",
        "nav/Nav.Component.c",
    ] {
        assert!(photon.join(file).is_file(), "missing onboard photon/{file}");
    }

    // Derived-type files use mangled names.
    assert!(photon.join("_dynarray_/SliceOfNavLatLon.h").is_file());
    assert!(photon.join("_dynarray_/SliceOfNavLatLon.gen.c").is_file());
    assert!(photon.join("_generic_/NavPairU8U16.h").is_file());
    assert!(photon.join("_generic_/NavPairU8U16.gen.c").is_file());

    // Builtin private sources plus config and blob.
    for file in [
        "CmdDecoder.Private.h",
        "CmdDecoder.Private.c",
        "CmdEncoder.Private.h",
        "CmdEncoder.Private.c",
        "StatusEncoder.Private.h",
        "StatusEncoder.Private.c",
        "StatusDecoder.Private.h",
        "StatusDecoder.Private.c",
        "Tm.Private.inc.c",
        "Package.Private.inc.c",
        "Config.h",
    ] {
        assert!(photon.join(file).is_file(), "missing onboard photon/{file}");
    }

    // Device aggregators.
    assert!(onboard.join("PhotonMcu.h").is_file());
    assert!(onboard.join("PhotonMcu.c").is_file());
    assert!(onboard.join("PhotonGc.h").is_file());
    assert!(onboard.join("PhotonGc.c").is_file());

    // Bundled module sources are copied under their dest directory.
    assert!(onboard.join("modules/core/CoreHelpers.c").is_file());

    // Ground control tree.
    assert!(gc.join("nav/Position.hpp").is_file());
    assert!(gc.join("core/Error.hpp").is_file());
    assert!(gc.join("_generic_/NavPairU8U16.hpp").is_file());
    assert!(gc.join("_msgs_/NavMsg0.hpp").is_file());
    assert!(gc.join("Interface.hpp").is_file());
}

#[test]
fn device_aggregator_defines_its_world_view() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path());
    let out = tmp.path().join("out");
    generate_into(tmp.path(), &out);

    let mcu = read(out.join("onboard/PhotonMcu.h"));
    assert!(mcu.contains("#define PHOTON_DEVICE_MCU"));
    assert!(mcu.contains("#define PHOTON_DEVICE_ID 1"));
    assert!(mcu.contains("#define PHOTON_DEVICE_ID_GC 2"));
    assert!(mcu.contains("#define PHOTON_HAS_MODULE_CORE"));
    assert!(mcu.contains("#define PHOTON_HAS_MODULE_NAV"));
    // mcu listens to its own telemetry.
    assert!(mcu.contains("#define PHOTON_HAS_DEVICE_SOURCE_MCU"));
    assert!(mcu.contains("#define PHOTON_HAS_TM_SOURCE_NAV"));
    assert!(!mcu.contains("#define PHOTON_IS_MASTER"));
    assert!(mcu.contains("#include \"photon/Config.h\""));
    assert!(mcu.contains("#include \"photon/nav/Nav.Component.h\""));
    assert!(mcu.contains("#include \"photon/CmdDecoder.Private.h\""));
    // .c bundled sources belong to the source aggregator only.
    assert!(!mcu.contains("#include \"modules/core/CoreHelpers.c\""));

    let mcu_c = read(out.join("onboard/PhotonMcu.c"));
    assert!(mcu_c.contains("#include \"PhotonMcu.h\""));
    assert!(mcu_c.contains("#include \"photon/CmdDecoder.Private.c\""));
    assert!(mcu_c.contains("#include \"modules/core/CoreHelpers.c\""));

    let gc = read(out.join("onboard/PhotonGc.h"));
    assert!(gc.contains("#define PHOTON_IS_MASTER"));
    assert!(gc.contains("#define PHOTON_HAS_DEVICE_TARGET_MCU"));
    assert!(gc.contains("#define PHOTON_HAS_CMD_TARGET_NAV"));
}

#[test]
fn generation_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path());
    let out_a = tmp.path().join("out_a");
    let out_b = tmp.path().join("out_b");
    generate_into(tmp.path(), &out_a);
    generate_into(tmp.path(), &out_b);

    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(&out_a)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    paths.sort();
    assert!(paths.len() > 30, "expected a substantial tree");
    for path in paths {
        let rel = path.strip_prefix(&out_a).unwrap();
        let other = out_b.join(rel);
        assert_eq!(
            fs::read(&path).unwrap(),
            fs::read(&other).unwrap_or_else(|_| panic!("missing {}", other.display())),
            "{} differs between runs",
            rel.display()
        );
    }
}

#[test]
fn minimal_module_produces_only_layout_and_aggregators() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("project.toml"),
        "[project]\nname = \"tiny\"\nmaster = \"only\"\nmcc_id = 9\nmodule_dirs = [\"modules\"]\n\n[[devices]]\nname = \"only\"\nid = 1\nmodules = [\"m\"]\n",
    )
    .unwrap();
    let m = tmp.path().join("modules/m");
    fs::create_dir_all(&m).unwrap();
    fs::write(tmp.path().join("modules/dir.toml"), "modules = [\"m\"]\n").unwrap();
    fs::write(m.join("mod.toml"), "id = 1\ndest = \"modules/m\"\ndecode = \"m.decode\"\n")
        .unwrap();
    fs::write(m.join("m.decode"), "module m\n").unwrap();

    let out = tmp.path().join("out");
    generate_into(tmp.path(), &out);

    let mod_dir = out.join("onboard/photon/m");
    assert!(mod_dir.is_dir());
    assert_eq!(fs::read_dir(&mod_dir).unwrap().count(), 0);
    assert!(out.join("onboard/PhotonOnly.h").is_file());
}
