use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use dotenv::dotenv;
use log::{debug, info};
use structopt::StructOpt;

use materials_sync::config::Config;
use materials_sync::environment::Environment;
use materials_sync::material::{Material, MaterialDraft};
use materials_sync::Synchronizer;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "materials-sync",
    about = "Read and edit the cached recycling material guides",
    version = info::VERSION
)]
struct Opt {
    /// Only touch the local tiers, never the remote API
    #[structopt(long)]
    offline: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Print every material
    List,

    /// Print one material
    Get {
        /// The material ID
        id: String,
    },

    /// Save the material described by a JSON file
    Save {
        /// A JSON object with at least an `id`
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },

    /// Delete a material
    Delete {
        /// The material ID
        id: String,
    },

    /// Fetch the remote list and cache it
    Sync,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();
    let logger = Arc::new(log::initialize_logger());

    let config = Config::from_env()?;
    debug!(logger, "Loaded configuration"; "data_dir" => %config.data_dir.display());

    let environment = Environment::from_config(&config, logger.clone()).await?;
    let synchronizer = Synchronizer::new(environment, config.retained_snapshots);

    match opt.command {
        Command::List => {
            let materials = if opt.offline {
                synchronizer.list_local()
            } else {
                synchronizer.list_materials().await
            };

            print_json(&materials)?;
        }
        Command::Get { id } => {
            let material = if opt.offline {
                let id = materials_sync::normalization::normalize_key(&id);
                synchronizer.list_local().into_iter().find(|m| m.id == id)
            } else {
                synchronizer.get_material_by_id(&id).await
            };

            print_json(&material)?;
        }
        Command::Save { file } => {
            let contents = fs::read_to_string(&file)?;
            let draft: MaterialDraft = serde_json::from_str(&contents)?;

            let saved = if opt.offline {
                synchronizer.save_material(draft)
            } else {
                synchronizer.push_material(draft).await?
            };

            report(saved, "save")?;
        }
        Command::Delete { id } => {
            let deleted = if opt.offline {
                synchronizer.delete_material(&id)
            } else {
                synchronizer.remove_material(&id).await?
            };

            report(deleted, "delete")?;
        }
        Command::Sync => {
            let materials: Vec<Material> = synchronizer.refresh().await?;
            info!(logger, "Synchronized materials"; "count" => materials.len());

            print_json(&materials)?;
        }
    }

    synchronizer.settle().await;

    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(succeeded: bool, action: &str) -> Result<(), Box<dyn Error>> {
    if succeeded {
        println!("{}", serde_json::json!({ "ok": true }));
        Ok(())
    } else {
        Err(format!("unable to {} material", action).into())
    }
}
