// Grading Orchestrator - Build Task Runner
// Unified build system using the cargo xtask pattern

use anyhow::{Context, Result};
use xshell::{cmd, Shell};

fn main() -> Result<()> {
    let sh = Shell::new()?;
    let args: Vec<_> = std::env::args().skip(1).collect();

    match args.first().map(|s| s.as_str()) {
        Some("build") => {
            let release = args.contains(&"--release".to_string());
            build(&sh, release)
        }
        Some("test") => test(&sh),
        Some("format") => {
            let check = args.contains(&"--check".to_string());
            format(&sh, check)
        }
        Some("clippy") => clippy(&sh),
        Some("run") => run(&sh, &args[1..]),
        Some("clean") => clean(&sh),
        Some("ci") => ci(&sh),
        Some("dist") => dist(&sh),
        Some("check-config") => {
            if args.len() < 2 {
                eprintln!("Error: check-config requires a config file path");
                eprintln!("Usage: cargo xtask check-config <path> [--rubric <path>]");
                std::process::exit(1);
            }
            let rubric = args.iter().position(|a| a == "--rubric").and_then(|i| args.get(i + 1));
            check_config(&sh, &args[1], rubric.map(|s| s.as_str()))
        }
        _ => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Grading Orchestrator - Build Commands:");
    println!();
    println!("Usage: cargo xtask <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  build [--release]          Build the workspace");
    println!("  test                       Run all tests");
    println!("  format [--check]           Format code (check mode doesn't modify)");
    println!("  clippy                     Run clippy checks");
    println!("  run [ARGS...]              Build and run the orchestrator");
    println!("  clean                      Clean build artifacts");
    println!("  ci                         Run all CI checks (format + clippy + build + test)");
    println!("  dist                       Create a release distribution package (tar.gz)");
    println!("  check-config <path>        Validate a config document through the server's own loader");
    println!("                             [--rubric <path>]  also validate a rubric file");
    println!();
    println!("Examples:");
    println!("  cargo xtask build --release");
    println!("  cargo xtask check-config conf/config.toml --rubric rubrics/hw1.json");
}

/// Build the workspace.
fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("Building grading-orchestrator{}...", if release { " (release)" } else { "" });

    let _dir = sh.push_dir(project_root());
    if release {
        cmd!(sh, "cargo build --workspace --release").run().context("build failed")?;
        create_distribution(sh)?;
    } else {
        cmd!(sh, "cargo build --workspace").run().context("build failed")?;
    }

    println!("Build complete.");
    Ok(())
}

/// Stage the release binaries and a default config under `build/dist`.
fn create_distribution(sh: &Shell) -> Result<()> {
    let project = project_root();
    let dist_dir = project.join("build/dist");

    cmd!(sh, "mkdir -p {dist_dir}/bin").run()?;
    cmd!(sh, "mkdir -p {dist_dir}/conf").run()?;
    cmd!(sh, "mkdir -p {dist_dir}/logs").run()?;

    for bin in ["grading-orchestrator", "prefill-server", "decode-server"] {
        let src = project.join(format!("target/release/{bin}"));
        let dst = dist_dir.join(format!("bin/{bin}"));
        if src.exists() {
            cmd!(sh, "cp {src} {dst}").run()?;
        }
    }

    create_config_file(&dist_dir)?;
    Ok(())
}

fn create_config_file(dist_dir: &std::path::Path) -> Result<()> {
    let config_path = dist_dir.join("conf/config.toml");
    let config_content = r#"[server]
host = "0.0.0.0"
port = 8080

[orchestrator]
per_server_in_flight = 8
health_probe_interval_ms = "10s"

[[orchestrator.prefill_servers]]
host = "127.0.0.1"
port = 9001
model_kind = "code_analysis"
name = "code-analysis-prefill"

[[orchestrator.decode_servers]]
host = "127.0.0.1"
port = 9002
model_kind = "code_analysis"
name = "code-analysis-decode"

[[orchestrator.prefill_servers]]
host = "127.0.0.1"
port = 9003
model_kind = "feedback"
name = "feedback-prefill"

[[orchestrator.decode_servers]]
host = "127.0.0.1"
port = 9004
model_kind = "feedback"
name = "feedback-decode"

[orchestrator.call_budgets_ms]
prefill = 60000
decode = 180000
health = 2000
pipeline = 300000

[logging]
level = "info,grading_orchestrator=debug"
file = "logs/grading-orchestrator.log"

[pipeline]
output_compare_concurrency = 4
request_concurrency = 32
backpressure_queue_depth = 32
match_threshold = 0.80
"#;

    std::fs::write(config_path, config_content).context("failed to write default config")?;
    Ok(())
}

/// Run every workspace test.
fn test(sh: &Shell) -> Result<()> {
    let _dir = sh.push_dir(project_root());
    cmd!(sh, "cargo test --workspace").run().context("tests failed")?;
    Ok(())
}

fn format(sh: &Shell, check: bool) -> Result<()> {
    let _dir = sh.push_dir(project_root());
    if check {
        cmd!(sh, "cargo fmt --all -- --check").run().context("code is not formatted")?;
    } else {
        cmd!(sh, "cargo fmt --all").run().context("failed to format code")?;
    }
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    let _dir = sh.push_dir(project_root());
    cmd!(sh, "cargo clippy --workspace --all-targets -- --deny warnings")
        .run()
        .context("clippy checks failed")?;
    Ok(())
}

fn run(sh: &Shell, args: &[String]) -> Result<()> {
    let _dir = sh.push_dir(project_root());
    let mut cmd = cmd!(sh, "cargo run --bin grading-orchestrator --");
    for arg in args {
        cmd = cmd.arg(arg);
    }
    cmd.run().context("failed to run orchestrator")?;
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    let project = project_root();
    let _dir = sh.push_dir(&project);
    cmd!(sh, "cargo clean").run()?;

    let build_dir = project.join("build");
    if build_dir.exists() {
        cmd!(sh, "rm -rf {build_dir}").run()?;
    }
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    format(sh, true)?;
    clippy(sh)?;
    build(sh, true)?;
    test(sh)?;
    println!("CI pipeline completed successfully.");
    Ok(())
}

fn dist(sh: &Shell) -> Result<()> {
    build(sh, true)?;

    let project = project_root();
    let dist_dir = project.join("build/dist");
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let package_name = format!("grading-orchestrator-{}.tar.gz", timestamp);

    let _dir = sh.push_dir(&dist_dir);
    cmd!(sh, "tar czf {package_name} bin conf logs").run().context("failed to create tarball")?;

    println!("Distribution package: {}", dist_dir.join(&package_name).display());
    Ok(())
}

/// Validate a config document (and optionally a rubric file) through the
/// same loaders `serve`/`grade` use at startup, by linking the orchestrator
/// crate directly rather than shelling out to a running binary.
fn check_config(_sh: &Shell, config_path: &str, rubric_path: Option<&str>) -> Result<()> {
    use grading_orchestrator::config::Config;
    use grading_orchestrator::rubric_loader;

    let config = Config::load_from(std::path::Path::new(config_path))
        .with_context(|| format!("config at {config_path} failed validation"))?;
    println!("config ok: {} prefill server(s), {} decode server(s)", config.orchestrator.prefill_servers.len(), config.orchestrator.decode_servers.len());

    if let Some(rubric_path) = rubric_path {
        let rubric = rubric_loader::load_rubric(std::path::Path::new(rubric_path))
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("rubric at {rubric_path} failed validation"))?;
        println!("rubric ok: {} section(s), {} total points", rubric.sections.len(), rubric.total_points);
    }

    Ok(())
}

fn project_root() -> std::path::PathBuf {
    std::path::Path::new(&env!("CARGO_MANIFEST_DIR")).ancestors().nth(1).unwrap().to_path_buf()
}
