//! # bindfig demo application
//!
//! Registers one settings bundle, prints it, changes a value and saves it.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example bundle_demo
//! cargo run --example bundle_demo -- /tmp/bindfig-demo
//! RUST_LOG=bindfig=debug cargo run --example bundle_demo
//! ```
//!
//! ## Things to try
//!
//! | Feature            | How to exercise it                                               |
//! |--------------------|------------------------------------------------------------------|
//! | First registration | Run once: `demo.toml` is created with defaults and comments      |
//! | Migration          | Replace the file with `Version = "1.0.0"` and `port = 9000`      |
//! | Env override       | `DEMO_PORT=7000 cargo run --example bundle_demo` (not saved)     |
//! | Property override  | The greeting is always overridden in memory by `HELLO`           |
//! | Stale keys         | Add `legacy = 1` to the file and run again                       |

mod config;

use std::path::PathBuf;

use bindfig::{ConfigDir, EnvProvider, OverrideChain, Properties, Registry, RegistryConfig};
use tracing_subscriber::EnvFilter;

use config::DemoSettings;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bindfig=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bindfig-demo"));
    std::fs::create_dir_all(&dir)?;

    let props = Properties::new();
    props.set("HELLO", "hello from properties");

    let config = RegistryConfig::load_from(None)?;
    let registry = Registry::builder()
        .config_dir(ConfigDir::Path(dir))
        .apply_config(&config)
        .enable_overrides(true)
        .override_chain(OverrideChain::new().with(props).with(EnvProvider::new()))
        .build()?;

    let id = registry.register(DemoSettings::new())?;
    let settings = registry
        .instance::<DemoSettings>(id)
        .ok_or("bundle disappeared after registration")?;

    {
        let settings = settings.lock();
        println!("file:       {}", settings.meta.location().display());
        println!("greeting:   {}", settings.greeting);
        println!("listen on:  {}:{}", settings.server.host, settings.server.port);
        println!("features:   {}", settings.features.join(", "));
        println!("overridden: {:?}", settings.meta.substituted());
    }

    settings.lock().verbose = true;
    registry.save(id)?;

    if let Some(document) = registry.document(id) {
        println!("\n{document}");
    }
    Ok(())
}
