use anyhow::{Context, Result};
use clap::Parser;
use drive_squeeze::auth::Authenticator;
use drive_squeeze::batch::{process_folder, RunOptions};
use drive_squeeze::cli::{Args, Commands, TuningArgs};
use drive_squeeze::drive::{build_http_client, DriveClient};
use drive_squeeze::logger;
use drive_squeeze::processing::squeeze_file;
use drive_squeeze::status;
use std::path::Path;

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.quiet, args.verbose);

    match args.command {
        Commands::Run {
            folder_id,
            tuning,
            keep_original,
            dry_run,
        } => {
            let mut options = RunOptions::new(
                tuning.target_bytes()?,
                tuning.compression_options()?,
            )?;
            options.keep_original = keep_original;
            options.dry_run = dry_run;
            options.show_progress = !logger::is_quiet();

            let client = connect(&args.credentials, &args.token_cache)?;
            process_folder(&client, &folder_id, &options)
                .with_context(|| format!("Failed to process folder {}", folder_id))?;
        }
        Commands::Auth => {
            let http = build_http_client()?;
            let auth = Authenticator::new(&args.credentials, &args.token_cache, http.clone())?;
            let token = auth
                .interactive_login()
                .context("Authentication with Google Drive failed")?;
            let client = DriveClient::new(http, auth, token);
            let email = client.whoami().context("Error building Drive client")?;
            status!("✅ Authenticated as: {}", email);
            status!("💾 Token saved to {:?}", args.token_cache);
        }
        Commands::Squeeze {
            input,
            output,
            tuning,
        } => {
            squeeze_local(&input, &output, &tuning)?;
        }
    }

    Ok(())
}

fn connect(credentials: &Path, token_cache: &Path) -> Result<DriveClient> {
    status!("🔐 Authenticating with Google Drive...");
    let http = build_http_client()?;
    let auth = Authenticator::new(credentials, token_cache, http.clone())
        .context("Cannot load OAuth client credentials")?;
    let token = auth
        .obtain_token()
        .context("Authentication with Google Drive failed")?;

    let client = DriveClient::new(http, auth, token);
    let email = client
        .whoami()
        .context("Authenticated, but the Drive API rejected the token")?;
    status!("✅ Authenticated as: {}", email);
    Ok(client)
}

fn squeeze_local(input: &Path, output: &Path, tuning: &TuningArgs) -> Result<()> {
    let target = tuning.target_bytes()?;
    let options = tuning.compression_options()?;
    squeeze_file(input, output, target, &options)
        .with_context(|| format!("Failed to compress {:?}", input))?;
    Ok(())
}
