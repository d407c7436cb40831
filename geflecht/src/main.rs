#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::similar_names)]

//! The `geflecht` node binary: loads the configuration and identity,
//! replays the stored chain and, if asked to, mints blocks.

use fidem::Identity;
use geflecht::{block_storage::BlockStorage, config::Config, keychain::Keychain};
use std::{fs, path::PathBuf, time::Duration};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
struct Opt {
    /// Path to the configuration file.
    #[structopt(short, long, default_value = "./config/geflecht.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    log::debug!("Command line arguments: {:#?}", opt);

    let config_data =
        fs::read_to_string(&opt.config).expect("Could not read the configuration file.");
    let config: Config =
        toml::from_str(&config_data).expect("Could not parse the configuration file.");

    let identity = match fs::read_to_string(&config.identity_file) {
        Ok(hex) => Identity::from_hex(hex.trim()).expect("Identity could not be loaded."),
        Err(_) => {
            let identity = Identity::generate();
            fs::write(&config.identity_file, identity.hex())
                .expect("Could not store the generated identity.");
            log::info!("Generated a fresh identity: {}", identity.fingerprint());
            identity
        }
    };
    log::info!("Signing as {}.", identity.fingerprint());

    let block_storage =
        BlockStorage::new(&config.data_dir).expect("Could not open the block storage.");
    let participate = config.participate;
    let keychain = Keychain::new(identity, config, block_storage);

    let replayed = keychain
        .restore()
        .await
        .expect("Could not replay the stored chain.");
    log::info!("Replayed {} stored blocks.", replayed);

    if !participate {
        log::info!("Participation is disabled, nothing to do.");
        return;
    }

    loop {
        match keychain.start_generation().await {
            Ok(Some(block)) => match keychain.submit_key_block(block).await {
                Ok(block) => log::info!("Minted block {}.", block.number),
                Err(err) => log::warn!("Own block was rejected: {}", err),
            },
            // cancelled by an incoming block, wait for the new tip
            Ok(None) => keychain.wait_resume().await,
            Err(err) => {
                log::warn!("Block generation failed: {}", err);
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        }
    }
}
