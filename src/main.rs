mod config;
#[cfg(not(target_os = "espidf"))]
mod dry_run;
#[cfg(target_os = "espidf")]
mod firmware;

use config::Config;

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    // Required for ESP-IDF patches
    esp_idf_svc::sys::link_patches();

    // Initialize logger
    esp_idf_svc::log::EspLogger::initialize_default();

    let config = Config::load()?;
    firmware::run(config)
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    dry_run::run(&config)
}
