//! Build script for treeduce
//!
//! Without the `mpi` feature nothing is compiled: the in-process thread
//! backend needs no native code. With it, this script locates an MPI
//! installation, compiles the C shim in `csrc/`, and links against MPI.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=csrc/treeduce_mpi.c");
    println!("cargo:rerun-if-changed=csrc/treeduce_mpi.h");
    for var in ["MPI_PKG_CONFIG", "MPICC", "MPI_HOME", "CRAY_MPICH_DIR"] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    if env::var_os("CARGO_FEATURE_MPI").is_none() {
        return;
    }

    let mpi = locate_mpi().unwrap_or_else(|| {
        panic!(
            "The `mpi` feature needs an MPI installation. Install MPICH or OpenMPI and either:\n\
             - set MPI_PKG_CONFIG to its pkg-config name (e.g. 'mpich' or 'ompi')\n\
             - put 'mpicc' on PATH (or point MPICC at it)\n\
             - set MPI_HOME (or CRAY_MPICH_DIR on Cray systems) to the install prefix"
        )
    });
    eprintln!("treeduce: using MPI from {}", mpi.origin);

    let mut build = cc::Build::new();
    build
        .file("csrc/treeduce_mpi.c")
        .include("csrc")
        .includes(&mpi.include_paths)
        .warnings(true)
        .extra_warnings(true);
    if env::var_os("CARGO_FEATURE_DEBUG").is_some() {
        build.define("TREEDUCE_DEBUG", None);
    }
    if env::var("PROFILE").as_deref() == Ok("release") {
        build.opt_level(3);
    }
    build.compile("treeduce_mpi");

    for path in &mpi.link_paths {
        println!("cargo:rustc-link-search=native={}", path.display());
        // RPATH so the binary finds the same libmpi at runtime
        println!("cargo:rustc-link-arg=-Wl,-rpath,{}", path.display());
    }
    for lib in &mpi.libs {
        println!("cargo:rustc-link-lib={lib}");
    }
}

struct MpiInstall {
    origin: String,
    include_paths: Vec<PathBuf>,
    link_paths: Vec<PathBuf>,
    libs: Vec<String>,
}

fn locate_mpi() -> Option<MpiInstall> {
    let pkg_names = env::var("MPI_PKG_CONFIG")
        .ok()
        .into_iter()
        .chain(["mpich", "ompi", "mpi"].map(String::from));

    pkg_names
        .filter_map(|name| from_pkg_config(&name))
        .next()
        .or_else(from_mpicc)
        .or_else(|| {
            ["MPI_HOME", "CRAY_MPICH_DIR"]
                .into_iter()
                .filter_map(|var| env::var(var).ok().map(|dir| (var, dir)))
                .find_map(|(var, dir)| from_prefix(Path::new(&dir), var))
        })
        .or_else(|| {
            ["/usr", "/usr/local", "/opt/mpich", "/opt/openmpi"]
                .into_iter()
                .find_map(|prefix| from_prefix(Path::new(prefix), "well-known prefix"))
        })
}

fn from_pkg_config(name: &str) -> Option<MpiInstall> {
    let lib = pkg_config::Config::new()
        .cargo_metadata(false)
        .probe(name)
        .ok()?;
    Some(MpiInstall {
        origin: format!("pkg-config {name} {}", lib.version),
        include_paths: lib.include_paths,
        link_paths: lib.link_paths,
        libs: lib.libs,
    })
}

fn from_mpicc() -> Option<MpiInstall> {
    let mpicc = env::var("MPICC").unwrap_or_else(|_| "mpicc".to_string());
    // MPICH understands -show, Open MPI understands --showme
    ["-show", "--showme"].into_iter().find_map(|flag| {
        let output = Command::new(&mpicc).arg(flag).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let mut install = parse_compiler_line(&String::from_utf8_lossy(&output.stdout));
        install.origin = format!("{mpicc} {flag}");
        Some(install)
    })
}

fn parse_compiler_line(line: &str) -> MpiInstall {
    let mut install = MpiInstall {
        origin: String::new(),
        include_paths: Vec::new(),
        link_paths: Vec::new(),
        libs: Vec::new(),
    };
    for part in line.split_whitespace() {
        if let Some(path) = part.strip_prefix("-I") {
            install.include_paths.push(PathBuf::from(path));
        } else if let Some(path) = part.strip_prefix("-L") {
            install.link_paths.push(PathBuf::from(path));
        } else if let Some(lib) = part.strip_prefix("-l") {
            install.libs.push(lib.to_string());
        }
    }
    if install.libs.is_empty() {
        install.libs.push("mpi".to_string());
    }
    install
}

fn from_prefix(prefix: &Path, origin: &str) -> Option<MpiInstall> {
    let include = prefix.join("include");
    if !include.join("mpi.h").exists() {
        return None;
    }
    let link_paths = ["lib", "lib64"]
        .into_iter()
        .map(|dir| prefix.join(dir))
        .filter(|dir| dir.is_dir())
        .collect();
    Some(MpiInstall {
        origin: format!("{} ({origin})", prefix.display()),
        include_paths: vec![include],
        link_paths,
        libs: vec!["mpi".to_string()],
    })
}
