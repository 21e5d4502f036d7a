use clap::Parser;
use harvest_common::FetchStrategy;
use harvest_config::HarvestConfig;
use harvest_web::HarvestRequest;
use std::path::PathBuf;

/// Harvest records from a listing page and the pages after it.
#[derive(Debug, Parser)]
#[command(name = "harvest", version)]
pub struct Args {
    /// Listing URL to start from.
    pub url: String,

    /// Only extract list containers carrying this class.
    #[arg(long = "class")]
    pub class_hint: Option<String>,

    /// Stop after this many listing pages.
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Fetch at most this many detail pages.
    #[arg(long)]
    pub max_details: Option<usize>,

    /// Skip detail page enrichment.
    #[arg(long)]
    pub no_enrich: bool,

    /// Concurrent detail fetches.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Retrieval strategies in fallback order, e.g. `async-http,headless-browser`.
    #[arg(long, value_delimiter = ',')]
    pub strategies: Vec<FetchStrategy>,

    #[arg(long, env = "HARVEST_CONFIG", default_value = "harvest.yaml")]
    pub config: PathBuf,

    /// Write JSON lines here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Also write the full run report as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl Args {
    /// Flags beat the config file.
    pub fn apply_overrides(&self, cfg: &mut HarvestConfig) {
        if !self.strategies.is_empty() {
            cfg.fetch.strategies = self.strategies.clone();
        }
        if let Some(workers) = self.workers {
            cfg.enrich.workers = workers.max(1);
        }
        if self.no_enrich {
            cfg.enrich.enabled = false;
        }
    }

    pub fn request(&self) -> HarvestRequest {
        let mut req = HarvestRequest::new(self.url.clone());
        req.class_hint = self.class_hint.clone();
        req.max_pages = self.max_pages;
        req.max_details = self.max_details;
        req.enrich = !self.no_enrich;
        req
    }
}
