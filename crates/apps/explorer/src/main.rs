mod script;

use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use drilldown::{Explorer, ExplorerConfig, ExplorerParts, NoUrlState};
use foundation::SystemClock;
use layers::{HeadlessMap, MapEngine, PointerEvent, PointerKind};
use storage::FileStore;
use streaming::{TileUrlService, WfsVectorService};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::script::Step;

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive the region drill-down against the live services")]
struct Args {
    /// JSON config file (defaults apply to anything it leaves out)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the boundary feature service URL
    #[arg(long)]
    vector_url: Option<String>,

    /// Override the coverage tile service base URL
    #[arg(long)]
    raster_url: Option<String>,

    /// Directory for the durable response cache
    #[arg(long, default_value = ".region-explorer-cache")]
    cache_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the explorer, then apply each step in order
    Run {
        /// home | select:<name> | click:<a>[/<b>[/<c>]] | crumb:<1|2|3> | year:<y>
        steps: Vec<Step>,
    },

    /// Delete every cached collection and tile URL
    ClearCache,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ExplorerConfig::from_path(path)?,
        None => ExplorerConfig::default(),
    };
    if let Some(url) = args.vector_url {
        config.services.vector_url = url;
    }
    if let Some(url) = args.raster_url {
        config.services.raster_url = url;
    }
    config.validate()?;

    let store = FileStore::open(&args.cache_dir)?;
    let map = HeadlessMap::new(config.viewport.home_camera(), config.viewport.min_zoom);
    let parts = ExplorerParts {
        map,
        vector: Rc::new(WfsVectorService::new(config.services.vector_url.clone())),
        raster: Rc::new(TileUrlService::new(config.services.raster_url.clone())),
        store: Box::new(store),
        clock: Rc::new(SystemClock),
        url: Box::new(NoUrlState),
    };
    let explorer = Explorer::new(config, parts);

    match args.command {
        Command::ClearCache => {
            explorer.clear_cache();
            println!("cleared cache in {}", args.cache_dir.display());
        }
        Command::Run { steps } => {
            explorer.start().await;
            print_view(&explorer, "start");
            for step in &steps {
                let completed = apply(&explorer, step).await;
                info!(step = %step, completed, "step finished");
                print_view(&explorer, &step.to_string());
            }
        }
    }
    Ok(())
}

async fn apply(explorer: &Explorer<HeadlessMap>, step: &Step) -> bool {
    match step {
        Step::Home => explorer.home().await,
        Step::Select(name) => explorer.region_selected(name).await,
        Step::Crumb(level) => explorer.breadcrumb_clicked(*level).await,
        Step::Year(year) => explorer.year_changed(*year).await,
        Step::Click(region) => {
            let levels = &explorer.drilldown().config().levels;
            let slot = levels.slot(region.level());
            let hit = explorer
                .drilldown()
                .layers()
                .find_region(&slot.source_id, region);
            let Some(hit) = hit else {
                warn!(region = %region, layer = %slot.layer_id, "region not on the map");
                return false;
            };
            let at = hit.bounds.map(|b| b.center()).unwrap_or_default();
            let click = PointerEvent::new(slot.layer_id, PointerKind::Click, Some(hit.id), at);
            explorer.pointer(&click).await
        }
    }
}

fn print_view(explorer: &Explorer<HeadlessMap>, label: &str) {
    let map = explorer.map().borrow();
    let camera = map.camera();
    println!("[{label}] {} (year {})", explorer.breadcrumb(), explorer.year());
    println!(
        "  camera {:.4},{:.4} z{:.2}",
        camera.center[0], camera.center[1], camera.zoom
    );
    for id in map.layer_ids().iter().rev() {
        println!("  layer {id}");
    }
}
