//! Desktop runner: `backdrop [page.json]`
//!
//! Loads a page description (the bundled demo page by default) and opens a
//! window per fluid-enabled surface. Set `RUST_LOG=info` for lifecycle logs.

use std::path::PathBuf;

use sim::StaticPage;

const DEMO_PAGE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/demo_page.json");

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEMO_PAGE));

    let page = match StaticPage::load(&path) {
        Ok(page) => page,
        Err(e) => {
            log::error!("{}: {}", path.display(), e);
            std::process::exit(1);
        }
    };
    log::info!(
        "Loaded {} with {} surface(s), {} element(s)",
        path.display(),
        page.surfaces.len(),
        page.elements.len()
    );

    if let Err(e) = backdrop::app::run(page) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
