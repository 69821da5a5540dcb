// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("dbulk")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Incremental parallel builder for source package templates")
        .arg(
            Arg::new("explain")
                .short('d')
                .long("explain")
                .action(ArgAction::SetTrue)
                .help("Explain every staleness decision on stderr"),
        )
        .arg(
            Arg::new("distdir")
                .short('D')
                .long("distdir")
                .value_name("DIR")
                .help("Source distribution root (default: $HOME/void-packages)"),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_name("N")
                .help("Maximum number of concurrent jobs"),
        )
        .arg(
            Arg::new("dry-run")
                .short('n')
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Plan and mark builds finished without spawning anything"),
        )
        .arg(
            Arg::new("tool")
                .short('t')
                .long("tool")
                .value_name("NAME")
                .help("Alternate tool mode (reserved; skips the build loop)"),
        )
        .arg(
            Arg::new("arch")
                .short('a')
                .long("arch")
                .value_name("ARCH")
                .help("Cross-compile for this target architecture"),
        )
        .arg(
            Arg::new("targets")
                .num_args(0..)
                .help("Package names to build (all of srcpkgs/ when empty)"),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("dbulk.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
