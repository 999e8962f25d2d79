use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for kiln")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, doc, smoke bake
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
    /// Bake a generated mesh through kiln-cli on the headless backend
    Smoke,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            run_fmt()?;
            run_clippy()?;
            run_tests()?;
            run_doc()?;
            run_smoke()?;
        }
        Commands::Fmt => run_fmt()?,
        Commands::Clippy => run_clippy()?,
        Commands::Test => run_tests()?,
        Commands::Doc => run_doc()?,
        Commands::Build => run_build()?,
        Commands::Smoke => run_smoke()?,
    }

    Ok(())
}

fn cargo(what: &str, args: &[&str]) -> Result<()> {
    println!("==> Running cargo {what}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {what} failed");
    }
    Ok(())
}

fn run_fmt() -> Result<()> {
    cargo("fmt --check", &["fmt", "--all", "--", "--check"])
}

fn run_clippy() -> Result<()> {
    cargo(
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn run_tests() -> Result<()> {
    cargo("test", &["test", "--workspace"])
}

fn run_doc() -> Result<()> {
    cargo("doc", &["doc", "--workspace", "--no-deps"])
}

fn run_build() -> Result<()> {
    cargo("build", &["build", "--workspace"])
}

/// A unit cube, one quad per face.
const CUBE_OBJ: &str = "\
o cube
v -1 -1 -1
v 1 -1 -1
v 1 1 -1
v -1 1 -1
v -1 -1 1
v 1 -1 1
v 1 1 1
v -1 1 1
f 1 4 3 2
f 5 6 7 8
f 1 2 6 5
f 4 8 7 3
f 1 5 8 4
f 2 3 7 6
";

fn run_smoke() -> Result<()> {
    let dir = PathBuf::from("target").join("xtask-smoke");
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let obj = dir.join("cube.obj");
    std::fs::write(&obj, CUBE_OBJ).with_context(|| format!("writing {}", obj.display()))?;

    let obj = obj.to_string_lossy();
    cargo(
        "run -p kiln-cli -- obj",
        &["run", "-q", "-p", "kiln-cli", "--", "obj", &obj],
    )?;
    cargo(
        "run -p kiln-cli -- bake",
        &[
            "run", "-q", "-p", "kiln-cli", "--", "bake", "--obj", &obj, "--size", "64", "--at", "0,0,4",
        ],
    )
}
