//! confgen CLI
//!
//! Entry point for the `confgen` command-line tool.

use clap::{Parser, Subcommand};
use confgen::cache::cache_valid;
use confgen::checksum::parse_checksum;
use confgen::config::{expand_home, load_tree_file, EffectiveConfig, Settings, HOST_CONFIG_PATH};
use confgen::{
    merge, merge_keyed_list, merge_strict, remove_empty_values, ArtifactGate, ChecksumFile,
    CommandGenerator, ConfigTree, FingerprintStore, GateConfig, GateError, Outcome,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::info;

/// Exit code for configuration and I/O errors
const EXIT_ERROR: i32 = 1;
/// Exit code for a violated precondition
const EXIT_PRECONDITION: i32 = 2;
/// Exit code for a failed generation step
const EXIT_GENERATION: i32 = 3;
/// Exit code when `checksum` reports a change or `cache-check` a stale file
const EXIT_CHANGED: i32 = 10;

#[derive(Parser)]
#[command(name = "confgen")]
#[command(about = "Configuration layering and idempotent artifact regeneration", version)]
struct Cli {
    /// Path to config file (default: ~/.config/confgen/config.toml only)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deep-merge an override file over a defaults file and print JSON
    Merge {
        /// Defaults (TOML or JSON)
        defaults: PathBuf,

        /// Overrides (TOML or JSON)
        overrides: PathBuf,

        /// Merge JSON arrays of records joined on this key
        #[arg(long, value_name = "KEY")]
        by: Option<String>,

        /// Reject kind changes (mapping, sequence, scalar) at the same key
        #[arg(long, conflicts_with = "by")]
        strict: bool,

        /// Drop null, empty strings and empty collections from the result
        #[arg(long)]
        prune: bool,
    },

    /// Print the regeneration decision without acting
    Decide {
        #[command(flatten)]
        artifact: ArtifactArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Regenerate the artifact when its fingerprint is stale
    Ensure {
        #[command(flatten)]
        artifact: ArtifactArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Forget the stored fingerprint so the next run regenerates
    Reset {
        /// Artifact identifier (certificate domain)
        #[arg(long)]
        id: String,
    },

    /// Compare a rendered file with its stored checksum
    Checksum {
        /// Rendered file
        file: PathBuf,

        /// File holding the previous checksum
        #[arg(long)]
        state: PathBuf,

        /// Store the current checksum after comparing
        #[arg(long)]
        write: bool,
    },

    /// Print the digest of one release archive from a sha256sums listing
    LookupChecksum {
        /// Listing file, one `<digest>  <file name>` per line
        listing: PathBuf,

        /// Application name prefix of the archive
        #[arg(long)]
        app: String,

        /// Operating system (matched lowercase)
        #[arg(long)]
        os: String,

        /// Architecture, e.g. amd64
        #[arg(long)]
        arch: String,

        /// Archive extension
        #[arg(long, default_value = "tar.gz")]
        ext: String,
    },

    /// Check that a cached file is younger than a maximum age
    CacheCheck {
        /// Cached file
        path: PathBuf,

        /// Maximum age in seconds
        #[arg(long)]
        max_age: u64,

        /// Delete the file when it is stale
        #[arg(long)]
        remove: bool,
    },

    /// Print the effective configuration with provenance
    Config {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct ArtifactArgs {
    /// Artifact identifier (certificate domain)
    #[arg(long)]
    id: String,

    /// Requested DH modulus size (overrides certificate.dh_size)
    #[arg(long)]
    dh_size: Option<u32>,

    /// Regenerate even when the fingerprint is valid
    #[arg(long)]
    force: bool,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Merge {
            defaults,
            overrides,
            by,
            strict,
            prune,
        } => run_merge(&defaults, &overrides, by.as_deref(), strict, prune),
        Commands::Decide { artifact, json } => run_decide(config_path, &artifact, json),
        Commands::Ensure { artifact, json } => run_ensure(config_path, &artifact, json),
        Commands::Reset { id } => run_reset(config_path, &id),
        Commands::Checksum { file, state, write } => run_checksum(&file, &state, write),
        Commands::LookupChecksum {
            listing,
            app,
            os,
            arch,
            ext,
        } => run_lookup_checksum(&listing, &app, &os, &arch, &ext),
        Commands::CacheCheck { path, max_age, remove } => run_cache_check(&path, max_age, remove),
        Commands::Config { json } => run_config(config_path, json),
    }
}

fn run_merge(defaults: &Path, overrides: &Path, by: Option<&str>, strict: bool, prune: bool) {
    let output = if let Some(key) = by {
        let defaults = load_records(defaults);
        let overrides = load_records(overrides);
        let merged: Vec<ConfigTree> = merge_keyed_list(&defaults, &overrides, key)
            .iter()
            .map(|record| if prune { remove_empty_values(record) } else { record.clone() })
            .collect();
        serde_json::to_value(merged)
    } else {
        let defaults = load_tree_or_exit(defaults);
        let overrides = load_tree_or_exit(overrides);

        let mut merged = if strict {
            match merge_strict(&defaults, &overrides) {
                Ok(tree) => tree,
                Err(e) => {
                    eprintln!("Merge error: {}", e);
                    process::exit(EXIT_ERROR);
                }
            }
        } else {
            merge(&defaults, &overrides)
        };
        if prune {
            merged = remove_empty_values(&merged);
        }
        Ok(merged.into_json())
    };

    match output.and_then(|value| serde_json::to_string_pretty(&value)) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(EXIT_ERROR);
        }
    }
}

fn load_tree_or_exit(path: &Path) -> ConfigTree {
    match load_tree_file(path) {
        Ok((tree, _digest)) => tree,
        Err(e) => {
            eprintln!("Error loading {}: {}", path.display(), e);
            process::exit(EXIT_ERROR);
        }
    }
}

/// Named-list mode reads a JSON array of mappings
fn load_records(path: &Path) -> Vec<ConfigTree> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            process::exit(EXIT_ERROR);
        }
    };

    match serde_json::from_str(&contents) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error parsing {}: expected a JSON array of mappings: {}", path.display(), e);
            process::exit(EXIT_ERROR);
        }
    }
}

fn load_config(config_path: Option<&Path>, dh_size: Option<u32>) -> (EffectiveConfig, Settings) {
    let host_path = expand_home(HOST_CONFIG_PATH);
    let cli_overrides = dh_size.map(|size| {
        ConfigTree::new().with("certificate", ConfigTree::new().with("dh_size", i64::from(size)))
    });

    let effective = match EffectiveConfig::build(Some(&host_path), config_path, cli_overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(EXIT_ERROR);
        }
    };

    let settings = match effective.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(EXIT_ERROR);
        }
    };

    (effective, settings)
}

fn build_gate(settings: &Settings, generator: &CommandGenerator, id: &str) -> ArtifactGate {
    let certificate = &settings.certificate;
    let paths = generator.paths(id);
    let config = GateConfig::new(id, certificate.dh_size)
        .with_key_size(certificate.key_size)
        .with_lifetime_days(certificate.lifetime_days)
        .with_threshold_days(certificate.threshold_days)
        .with_artifact_path(&paths.crt)
        .with_required_paths(paths.all())
        .with_lock_timeout(settings.lock_timeout());

    match ArtifactGate::new(config) {
        Ok(gate) => gate,
        Err(e) => exit_with_gate_error(e),
    }
}

fn exit_with_gate_error(e: GateError) -> ! {
    eprintln!("Error: {}", e);
    let code = match e {
        GateError::PreconditionViolation(_) => EXIT_PRECONDITION,
        GateError::GenerationStepFailure { .. } => EXIT_GENERATION,
        _ => EXIT_ERROR,
    };
    process::exit(code);
}

fn generator_for(settings: &Settings) -> CommandGenerator {
    CommandGenerator::new(
        settings.output_path(),
        settings.certificate.key_size,
        settings.commands.clone(),
    )
}

fn run_decide(config_path: Option<&Path>, artifact: &ArtifactArgs, json_output: bool) {
    let (_, settings) = load_config(config_path, artifact.dh_size);
    let generator = generator_for(&settings);
    let gate = build_gate(&settings, &generator, &artifact.id);
    let store = FingerprintStore::new(settings.store_path());

    let decision = match gate.decide(&store, artifact.force) {
        Ok(decision) => decision,
        Err(e) => exit_with_gate_error(e),
    };

    if json_output {
        match decision.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(EXIT_ERROR);
            }
        }
    } else {
        println!("{}", decision.to_human());
    }
}

fn run_ensure(config_path: Option<&Path>, artifact: &ArtifactArgs, json_output: bool) {
    let (_, settings) = load_config(config_path, artifact.dh_size);
    let generator = generator_for(&settings);
    let gate = build_gate(&settings, &generator, &artifact.id);
    let store = FingerprintStore::new(settings.store_path());

    let outcome = match gate.ensure(&store, &generator, artifact.force) {
        Ok(outcome) => outcome,
        Err(e) => exit_with_gate_error(e),
    };

    if json_output {
        let fingerprint = match &outcome {
            Outcome::Regenerated { fingerprint, .. } => Some(fingerprint),
            Outcome::Valid(_) => None,
        };
        let output = serde_json::json!({
            "state": outcome.state(),
            "decision": outcome.decision(),
            "fingerprint": fingerprint,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(EXIT_ERROR);
            }
        }
    } else {
        println!("{}", outcome.decision().to_human());
        if let Outcome::Regenerated { fingerprint, .. } = &outcome {
            println!("  Regenerated: {}", generator.paths(&fingerprint.identifier).dir.display());
            if let Some(expires_at) = fingerprint.expires_at {
                println!("  Expires: {}", expires_at.to_rfc3339());
            }
        }
    }
}

fn run_reset(config_path: Option<&Path>, id: &str) {
    let (_, settings) = load_config(config_path, None);
    let store = FingerprintStore::new(settings.store_path());

    match store.reset(id) {
        Ok(true) => {
            info!(identifier = id, "fingerprint removed");
            println!("Fingerprint removed: {}", id);
        }
        Ok(false) => println!("No fingerprint stored for: {}", id),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(EXIT_ERROR);
        }
    }
}

fn run_checksum(file: &Path, state: &Path, write: bool) {
    let checksum = match confgen::checksum_file(file) {
        Ok(Some(checksum)) => checksum,
        Ok(None) => {
            eprintln!("File not found: {}", file.display());
            process::exit(EXIT_ERROR);
        }
        Err(e) => {
            eprintln!("Error reading {}: {}", file.display(), e);
            process::exit(EXIT_ERROR);
        }
    };

    let state_file = ChecksumFile::new(state);
    let status = match state_file.validate(&checksum) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("Error reading {}: {}", state.display(), e);
            process::exit(EXIT_ERROR);
        }
    };

    println!("{} {}", if status.changed { "changed" } else { "unchanged" }, status.checksum);

    if write {
        if status.changed {
            if let Err(e) = state_file.write(&status.checksum) {
                eprintln!("Error writing {}: {}", state.display(), e);
                process::exit(EXIT_ERROR);
            }
        }
    } else if status.changed {
        process::exit(EXIT_CHANGED);
    }
}

fn run_lookup_checksum(listing: &Path, app: &str, os: &str, arch: &str, ext: &str) {
    let contents = match fs::read_to_string(listing) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Error reading {}: {}", listing.display(), e);
            process::exit(EXIT_ERROR);
        }
    };
    let lines: Vec<&str> = contents.lines().collect();

    match parse_checksum(&lines, app, os, arch, ext) {
        Some(checksum) => println!("{}", checksum),
        None => {
            eprintln!("No {} archive for {}/{} (.{}) in {}", app, os, arch, ext, listing.display());
            process::exit(EXIT_ERROR);
        }
    }
}

fn run_cache_check(path: &Path, max_age: u64, remove: bool) {
    match cache_valid(path, Duration::from_secs(max_age), remove) {
        Ok(true) => println!("fresh {}", path.display()),
        Ok(false) => {
            println!("stale {}", path.display());
            process::exit(EXIT_CHANGED);
        }
        Err(e) => {
            eprintln!("Error checking {}: {}", path.display(), e);
            process::exit(EXIT_ERROR);
        }
    }
}

fn run_config(config_path: Option<&Path>, json_output: bool) {
    let (effective, settings) = load_config(config_path, None);

    if json_output {
        match effective.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(EXIT_ERROR);
            }
        }
        return;
    }

    println!("Effective configuration:");
    println!();
    println!("  Store: {}", settings.store_path().display());
    println!("  Output: {}", settings.output_path().display());
    println!("  Lock timeout: {}s", settings.lock_timeout_seconds);
    println!("  Lifetime: {} days", settings.certificate.lifetime_days);
    println!("  Threshold: {} days", settings.certificate.threshold_days);
    println!("  Key size: {}", settings.certificate.key_size);
    println!("  DH size: {}", settings.certificate.dh_size);
    println!();
    println!("Sources (lowest precedence first):");
    for source in &effective.sources {
        match (&source.path, &source.digest) {
            (Some(path), Some(digest)) => println!("  {:?}: {} (sha256 {})", source.origin, path, digest),
            _ => println!("  {:?}", source.origin),
        }
    }
}
