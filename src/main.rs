//! signy-layout CLI
//!
//! Entry point for the `signy-layout` command-line tool.

use clap::{Parser, Subcommand};
use signy_layout::keys::{load_public_key, KeyStore, PublicKey};
use signy_layout::{
    LayoutBuilder, LayoutConfig, LayoutError, LayoutResult, PromptPassphrase, SignedLayout,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "signy-layout")]
#[command(about = "Build and sign supply-chain layouts", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate keyrings, build the layout, and sign it
    Build {
        /// Layout plan (default: built-in bundle template)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Keystore directory (overrides the plan's `keystore`)
        #[arg(long, short = 'k')]
        keystore: Option<PathBuf>,

        /// Where to write the signed layout; must not exist
        #[arg(long, short = 'o')]
        output: PathBuf,
    },

    /// Print the built-in bundle plan as TOML
    Template,

    /// Keystore commands
    Keys {
        #[command(subcommand)]
        action: KeysCommands,
    },

    /// Summarize a signed layout and optionally check its signatures
    Show {
        /// Signed layout file
        layout: PathBuf,

        /// Public key files to verify signatures with
        #[arg(long = "key")]
        keys: Vec<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum KeysCommands {
    /// List key ids in a keystore
    List {
        /// Keystore directory
        #[arg(long, short = 'k')]
        keystore: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Build {
            config,
            keystore,
            output,
        } => run_build(config, keystore, output),
        Commands::Template => run_template(),
        Commands::Keys { action } => match action {
            KeysCommands::List { keystore, json } => run_keys_list(keystore, json),
        },
        Commands::Show { layout, keys, json } => run_show(layout, keys, json),
    };

    if let Err(e) = result {
        let kind = e.kind();
        tracing::debug!(error = ?e, "command failed");
        eprintln!("error[{}]: {}", kind.as_str(), e);
        process::exit(kind.exit_code());
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_build(
    config_path: Option<PathBuf>,
    keystore: Option<PathBuf>,
    output: PathBuf,
) -> LayoutResult<()> {
    let config = match config_path {
        Some(path) => LayoutConfig::from_file(&path)?,
        None => LayoutConfig::bundle_template(),
    };

    let root = keystore.or_else(|| config.keystore.clone()).ok_or_else(|| {
        LayoutError::InvalidInput(
            "no keystore given; pass --keystore or set `keystore` in the plan".to_string(),
        )
    })?;
    if output.exists() {
        return Err(LayoutError::PathCollision(output));
    }

    let store = KeyStore::new(root);
    let mut passphrases = PromptPassphrase::stdio();
    let signed = LayoutBuilder::new(&store, &mut passphrases).build(&config)?;
    signed.write_to_file(&output)?;

    println!(
        "Wrote {} ({} steps, {} inspections, {} keys, {} signatures, expires {})",
        output.display(),
        signed.signed.steps.len(),
        signed.signed.inspect.len(),
        signed.signed.keys.len(),
        signed.signatures.len(),
        signed.signed.expires
    );
    Ok(())
}

fn run_template() -> LayoutResult<()> {
    print!("{}", LayoutConfig::bundle_template().to_toml()?);
    Ok(())
}

fn run_keys_list(keystore: PathBuf, json_output: bool) -> LayoutResult<()> {
    let ids = KeyStore::new(keystore).list_key_ids()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else if ids.is_empty() {
        println!("No keys found.");
    } else {
        for id in ids {
            println!("{}", id);
        }
    }
    Ok(())
}

fn run_show(path: PathBuf, key_paths: Vec<PathBuf>, json_output: bool) -> LayoutResult<()> {
    let signed = SignedLayout::from_file(&path)?;
    signed.signed.check()?;

    let keys = key_paths
        .iter()
        .map(|p| load_public_key(p))
        .collect::<Result<Vec<PublicKey>, _>>()?;
    let verified = if keys.is_empty() {
        None
    } else {
        Some(signed.verify_signatures(&keys)?)
    };

    let layout = &signed.signed;
    if json_output {
        let steps: Vec<_> = layout
            .steps
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "threshold": s.threshold,
                    "pubkeys": s.pubkeys,
                })
            })
            .collect();
        let summary = serde_json::json!({
            "expires": layout.expires,
            "readme": layout.readme,
            "steps": steps,
            "inspections": layout.inspect.iter().map(|i| &i.name).collect::<Vec<_>>(),
            "keys": layout.keys.keys().collect::<Vec<_>>(),
            "signatures": signed.key_ids(),
            "verified": verified,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Layout: {}", path.display());
    println!("  Expires: {}", layout.expires);
    if !layout.readme.is_empty() {
        println!("  Readme: {}", layout.readme);
    }
    println!("  Steps:");
    for step in &layout.steps {
        println!(
            "    {} ({} of {} keys)",
            step.name,
            step.threshold,
            step.pubkeys.len()
        );
        if !step.expected_command.is_empty() {
            println!("      command: {}", step.expected_command.join(" "));
        }
    }
    if !layout.inspect.is_empty() {
        println!("  Inspections:");
        for inspection in &layout.inspect {
            println!("    {}", inspection.name);
        }
    }
    println!("  Signatures:");
    for keyid in signed.key_ids() {
        println!("    {}", keyid);
    }
    if let Some(verified) = verified {
        println!(
            "  Verified: {}/{} signatures",
            verified,
            signed.signatures.len()
        );
    }
    Ok(())
}
