//! The serialized package blob embedded into `Package.Private.inc.c`.
//!
//! Devices carry their own interface sources so ground control can rebuild
//! the package at connect time. The blob is the concatenated (file name,
//! contents) pairs with a SHA-3 fingerprint; the compression level is
//! recorded for the external blob compressor.

use sha3::{Digest, Sha3_512};

use crate::generator::src_builder::SrcBuilder;
use crate::project::Project;

/// Render the complete `Package.Private.inc.c` text.
pub fn gen_package_blob(project: &Project) -> String {
    let encoded = project.package().encode();
    let hash = Sha3_512::digest(&encoded);

    let mut out = SrcBuilder::new();
    out.append_numeric_define("_PHOTON_PACKAGE_SIZE", encoded.len());
    out.append_numeric_define(
        "_PHOTON_PACKAGE_COMPRESSION_LEVEL",
        project.cfg().compression_level(),
    );
    out.eol();
    out.append_byte_array_definition("static const", "_package", &encoded);
    out.eol();

    out.append_numeric_define("_PHOTON_PACKAGE_HASH_SIZE", hash.len());
    out.eol();
    out.append_byte_array_definition("static const", "_packageHash", &hash);
    out.eol();

    for device in project.devices() {
        out.append_device_ifdef(&device.name);
        out.eol();
        let name = device.name.as_bytes();
        out.append_numeric_define("_PHOTON_DEVICE_NAME_SIZE", name.len());
        out.eol();
        out.append_byte_array_definition("static const", "_deviceName", name);
        out.eol();
        out.append_endif();
        out.eol();
    }

    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::diag::Diagnostics;
    use std::fs;
    use std::path::Path;

    fn demo_project(root: &Path) -> Project {
        fs::create_dir_all(root.join("mod/nav")).unwrap();
        fs::write(
            root.join("project.toml"),
            "[project]\nname = \"demo\"\nmaster = \"mcu\"\nmcc_id = 0\nmodule_dirs = [\"mod\"]\n\n[[devices]]\nname = \"mcu\"\nid = 1\nmodules = [\"nav\"]\n",
        )
        .unwrap();
        fs::write(root.join("mod/dir.toml"), "modules = [\"nav\"]\n").unwrap();
        fs::write(
            root.join("mod/nav/mod.toml"),
            "id = 1\ndest = \"modules/nav\"\ndecode = \"nav.decode\"\n",
        )
        .unwrap();
        fs::write(root.join("mod/nav/nav.decode"), "module nav\n").unwrap();
        let mut diag = Diagnostics::new();
        Project::from_file(Config::new(), &mut diag, &root.join("project.toml")).unwrap()
    }

    #[test]
    fn blob_carries_package_hash_and_device_names() {
        let tmp = tempfile::tempdir().unwrap();
        let project = demo_project(tmp.path());
        let text = gen_package_blob(&project);
        assert!(text.contains("#define _PHOTON_PACKAGE_SIZE"));
        assert!(text.contains("static const uint8_t _package["));
        // SHA3-512 digest is 64 bytes.
        assert!(text.contains("#define _PHOTON_PACKAGE_HASH_SIZE 64"));
        assert!(text.contains("static const uint8_t _packageHash[64]"));
        assert!(text.contains("#ifdef PHOTON_DEVICE_MCU"));
        assert!(text.contains("#define _PHOTON_DEVICE_NAME_SIZE 3"));
        // Deterministic output.
        assert_eq!(text, gen_package_blob(&project));
    }
}
