use std::path::PathBuf;

use clap::{Parser, Subcommand};

use vaulted::chain::format_balance;
use vaulted::wallet::KeystoreExtension;
use vaulted::{BucketState, ContentId, FileRecord, FileUpload, VaultClient, VaultConfig, VaultError, CERE};

#[derive(Parser)]
#[command(name = "vaulted")]
#[command(author = "Vaulted Team")]
#[command(version)]
#[command(about = "Private file storage for wallet accounts on a content-addressed network", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run against an in-process network with a throwaway account
    #[arg(long, global = true, default_value_t = false)]
    memory: bool,

    /// Address of the account to connect (defaults to the only wallet's first account)
    #[arg(long, global = true)]
    account: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List wallet providers and their accounts
    Providers,

    /// Create a new keystore account
    Keygen {
        /// Display name of the account, used as the key file name
        name: String,

        /// Keystore directory (defaults to wallet.keystore_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Show the free balance of an account
    Balance {
        /// Address to query (defaults to the connected account)
        address: Option<String>,

        /// Network to query instead of the configured default
        #[arg(long)]
        network: Option<String>,
    },

    /// Show the connected account and the state of its bucket
    Status,

    /// Create the account's private bucket ahead of the first upload
    Bucket {
        /// Amount of CERE to deposit when the account has no deposit yet
        #[arg(long)]
        deposit: Option<u64>,
    },

    /// Upload a file
    Upload {
        /// File to upload
        file: PathBuf,

        /// MIME type to record
        #[arg(long)]
        mime_type: Option<String>,

        /// Also print a share link for the uploaded file
        #[arg(long, default_value_t = false)]
        share: bool,
    },

    /// List files in the account's directory index
    List,

    /// Print a signed share link for a stored file
    Share {
        /// Content id of the file
        cid: String,
    },

    /// Download a stored file through the CDN
    Download {
        /// Content id of the file
        cid: String,

        /// Access token (a client-side token is minted when omitted)
        #[arg(long, requires = "signature")]
        token: Option<String>,

        /// Signature accompanying the token
        #[arg(long, requires = "token")]
        signature: Option<String>,

        /// Directory to save the file into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Print the resolved configuration
    Config,
}

fn load_config(cli: &Cli) -> Result<VaultConfig, VaultError> {
    match (&cli.config, cli.memory) {
        (Some(path), _) => Ok(VaultConfig::from_file(path)?),
        (None, true) => Ok(VaultConfig::default()),
        (None, false) => Ok(VaultConfig::from_file(&VaultConfig::default_location())?),
    }
}

async fn connect(client: &VaultClient, account: Option<&str>) -> Result<(), VaultError> {
    let account = match account {
        Some(address) => {
            let providers = client.discover_providers().await?;
            let source = providers
                .iter()
                .find(|p| p.accounts.iter().any(|a| a.address == address))
                .map(|p| p.source.clone())
                .ok_or_else(|| VaultError::InvalidArgument(format!("No wallet exposes account {}", address)))?;
            client.connect_with_account(&source, Some(address)).await?
        }
        None => client.connect_wallet().await?,
    };
    log::info!("Using account {}", account.address);
    Ok(())
}

async fn find_record(client: &VaultClient, cid: &str) -> Result<FileRecord, VaultError> {
    let cid = ContentId::from(cid);
    client
        .refresh_files()
        .await?
        .into_iter()
        .find(|record| record.content_id == cid)
        .ok_or_else(|| VaultError::NotFound(format!("No file with content id {} in the index", cid)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }
    if let Commands::Keygen { name, dir } = &cli.command {
        let dir = dir.clone().unwrap_or_else(|| config.wallet.keystore_dir.clone());
        let address = KeystoreExtension::generate_into(&dir, name)?;
        println!("{}", address);
        return Ok(());
    }

    let client = if cli.memory {
        VaultClient::in_memory(config)?
    } else {
        VaultClient::from_config(config)?
    };

    match &cli.command {
        Commands::Providers => {
            for provider in client.discover_providers().await? {
                println!("{} ({})", provider.metadata.name, provider.source);
                for account in provider.accounts {
                    match account.display_name {
                        Some(name) => println!("  {} {}", account.address, name),
                        None => println!("  {}", account.address),
                    }
                }
            }
        }
        Commands::Balance { address, network } => {
            let address = match address {
                Some(address) => address.clone(),
                None => {
                    connect(&client, cli.account.as_deref()).await?;
                    client
                        .state()
                        .active_account()
                        .map(|a| a.address)
                        .ok_or(VaultError::SignerUnavailable)?
                }
            };
            let key = network.clone().unwrap_or_else(|| client.config().chain.default_network.clone());
            let network = client.switch_network(&key).await?;
            let balance = client.get_balance(&address).await?;
            println!("{}", format_balance(balance, network.decimals, &network.unit));
        }
        Commands::Status => {
            connect(&client, cli.account.as_deref()).await?;
            if let Some(account) = client.state().active_account() {
                println!("account {}", account.address);
            }
            match client.bucket_state() {
                Some(BucketState::Ready(bucket)) => println!("bucket {}", bucket),
                Some(BucketState::Provisioning) => println!("bucket provisioning"),
                Some(BucketState::ProvisionFailed(reason)) => println!("bucket failed: {}", reason),
                Some(BucketState::NoBucket) | None => println!("bucket none"),
            }
        }
        Commands::Bucket { deposit } => {
            connect(&client, cli.account.as_deref()).await?;
            let deposit = deposit.map(|cere| u128::from(cere) * CERE);
            let bucket = client.create_private_bucket(deposit).await?;
            println!("{}", bucket);
        }
        Commands::Upload { file, mime_type, share } => {
            connect(&client, cli.account.as_deref()).await?;
            let mut upload = FileUpload::from_path(file).await?;
            if let Some(mime_type) = mime_type {
                upload = upload.with_mime_type(mime_type.clone());
            }
            let record = client.upload_file(upload).await?;
            println!("{} {} {}", record.content_id, record.size, record.name);
            if *share {
                println!("{}", client.share_file(&record).await?);
            }
        }
        Commands::List => {
            connect(&client, cli.account.as_deref()).await?;
            for record in client.refresh_files().await? {
                println!("{} {} {}", record.content_id, record.size, record.name);
            }
        }
        Commands::Share { cid } => {
            connect(&client, cli.account.as_deref()).await?;
            let record = find_record(&client, cid).await?;
            println!("{}", client.share_file(&record).await?);
        }
        Commands::Download { cid, token, signature, out } => {
            connect(&client, cli.account.as_deref()).await?;
            let record = find_record(&client, cid).await?;
            let path = match (token, signature) {
                (Some(token), Some(signature)) => client.download_file(&record, token, signature, out).await?,
                _ => client.download_with_new_token(&record, out).await?,
            };
            println!("{}", path.display());
        }
        Commands::Config | Commands::Keygen { .. } => {}
    }

    if let Err(e) = client.disconnect_wallet().await {
        log::warn!("Failed to disconnect cleanly: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_token_requires_signature() {
        assert!(Cli::try_parse_from(["vaulted", "download", "cid1", "--token", "t"]).is_err());
        assert!(Cli::try_parse_from(["vaulted", "download", "cid1", "--token", "t", "--signature", "0x01"]).is_ok());
    }
}
