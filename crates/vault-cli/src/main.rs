//! secure-vault - command line access to the software vault
//!
//! Keeps one login/password pair behind an unlock code. Records live in a
//! JSON file in the vault directory or in the OS keychain; settings are
//! always read from `settings.json` in the vault directory.
//!
//! Biometric unlock needs a sensor and is not available here.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use vault_core::{
    Credential, FileStorage, KeychainStorage, NoSensor, SecureStorage, SettingsManager,
    SoftwareVault, VaultClient, VaultState,
};

/// Secure Vault - a code-protected credential store
#[derive(Parser, Debug)]
#[command(name = "secure-vault")]
#[command(version)]
#[command(about = "Store a login and password behind an unlock code")]
struct Args {
    /// Vault directory (defaults to the platform data directory)
    #[arg(long, env = "SECURE_VAULT_DIR")]
    dir: Option<PathBuf>,

    /// Where vault records are kept
    #[arg(long, value_enum, default_value_t = Store::File)]
    store: Store,

    /// Unlock code (prompted for when missing)
    #[arg(long, env = "SECURE_VAULT_CODE", hide_env_values = true)]
    code: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Store {
    File,
    Keychain,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show where the vault lives and whether it is locked
    Status,
    /// Set or change the unlock code
    SetCode,
    /// Store a login and password
    Save {
        #[arg(long)]
        login: String,
    },
    /// Print the stored login (and password with --show-password)
    Read {
        #[arg(long)]
        show_password: bool,
    },
    /// Delete the credentials and the unlock code
    Clean {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let dir = match args.dir.clone() {
        Some(dir) => dir,
        None => FileStorage::default_dir()?,
    };
    std::fs::create_dir_all(&dir)?;
    let settings = SettingsManager::new(&dir).get().clone();

    let storage: Arc<dyn SecureStorage> = match args.store {
        Store::File => Arc::new(
            FileStorage::with_dir(&dir).map_err(|e| format!("Failed to open vault storage: {}", e))?,
        ),
        Store::Keychain => Arc::new(KeychainStorage::new(None)),
    };

    let vault = Arc::new(SoftwareVault::new(storage, Arc::new(NoSensor)).with_settings(settings.clone()));
    let client = VaultClient::new(vault.clone()).with_settings(&settings);
    client.initial_setup(None).await?;

    // A freshly opened vault is only unlocked when no gate is set
    let gated = vault.state().await == VaultState::Locked;

    match args.command {
        Command::Status => {
            println!("Vault directory: {}", dir.display());
            println!("Record store:    {:?}", args.store);
            println!("State:           {:?}", vault.state().await);
            println!("Max attempts:    {}", settings.max_unlock_attempts);
        }
        Command::SetCode => {
            unlock(&vault, &client, args.code.as_deref()).await?;
            let code = rpassword::prompt_password("New unlock code: ")?;
            if code.is_empty() {
                return Err("Unlock code must not be empty".into());
            }
            let confirm = rpassword::prompt_password("Repeat unlock code: ")?;
            if code != confirm {
                return Err("Codes do not match".into());
            }
            client.set_unlock_code(code, None).await?;
            info!("Unlock code updated");
        }
        Command::Save { login } => {
            if !gated {
                return Err("Set an unlock code first (secure-vault set-code)".into());
            }
            unlock(&vault, &client, args.code.as_deref()).await?;
            let password = rpassword::prompt_password(format!("Password for {}: ", login))?;
            client
                .save_credential(&Credential::new(login, password), None)
                .await?;
            info!("Credentials saved");
        }
        Command::Read { show_password } => {
            unlock(&vault, &client, args.code.as_deref()).await?;
            match client.read_credential(None).await? {
                Some(credential) => {
                    println!("login: {}", credential.login());
                    if show_password {
                        println!("password: {}", credential.password());
                    }
                }
                None => println!("No credentials stored"),
            }
        }
        Command::Clean { yes } => {
            if !yes {
                eprint!("Type 'clean' to delete the vault: ");
                let mut answer = String::new();
                std::io::stdin().read_line(&mut answer)?;
                if answer.trim() != "clean" {
                    return Err("Aborted".into());
                }
            }
            client.clean(None).await?;
            info!("Vault cleaned");
        }
    }

    Ok(())
}

/// Unlock by code when the vault is locked
async fn unlock(
    vault: &SoftwareVault,
    client: &VaultClient,
    code: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    if vault.state().await != VaultState::Locked {
        return Ok(());
    }

    let code = match code {
        Some(code) => code.to_string(),
        None => rpassword::prompt_password("Unlock code: ")?,
    };

    client.unlock_by_code(code, None).await.map_err(|e| {
        if e.is_lockout() {
            format!("Too many failed attempts: {}", e)
        } else {
            format!("Failed to unlock vault: {}", e)
        }
    })?;
    info!("Vault unlocked");
    Ok(())
}
