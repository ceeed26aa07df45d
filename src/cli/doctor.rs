use std::path::Path;

use deckhand_core::{Driver, SimulatedDriver};

use crate::server::config::AppConfig;
use crate::server::load_config;

pub async fn run() -> anyhow::Result<()> {
    println!("🏥 Deckhand Doctor\n");

    print!("Checking configuration... ");
    let config = match load_config() {
        Ok(config) => {
            println!("✅ Loaded");
            config
        }
        Err(e) => {
            println!("❌ {:#}", e);
            println!("\n⚠️  Fix the configuration before running the other checks.");
            std::process::exit(1);
        }
    };

    let mut all_ok = true;

    all_ok &= check_env_file();
    all_ok &= check_web_ui(&config);
    all_ok &= check_driver(&config).await;
    all_ok &= check_port(&config).await;

    println!();
    if all_ok {
        println!("✅ All checks passed! Ready to run Deckhand.");
    } else {
        println!("⚠️  Some checks failed. Please fix the issues above.");
        std::process::exit(1);
    }

    Ok(())
}

fn check_env_file() -> bool {
    print!("Checking .env file... ");

    if Path::new(".env").exists() {
        println!("✅ Found");
    } else {
        println!("ℹ️  Not found (environment and config files are used as is)");
    }
    true
}

fn check_web_ui(config: &AppConfig) -> bool {
    print!("Checking web UI directory... ");

    let dir = Path::new(&config.web.static_dir);
    if dir.join("index.html").exists() {
        println!("✅ {}", dir.display());
    } else {
        println!("ℹ️  {} not built, the API is served without a UI", dir.display());
    }
    true
}

async fn check_driver(config: &AppConfig) -> bool {
    print!("Checking {} driver... ", config.driver.mode);

    let driver = SimulatedDriver::new(config.driver.simulated());
    if let Err(e) = driver
        .connect(Some(config.driver.port.clone()), config.driver.connect_options())
        .await
    {
        println!("❌ {}", e);
        return false;
    }
    println!("✅ Connected on {}", config.driver.port);

    match driver.serial_ports().await {
        Ok(ports) => println!("  ℹ️  Serial ports: {}", ports.join(", ")),
        Err(e) => println!("  ⚠️  Serial ports unavailable: {}", e),
    }
    match driver.versions().await {
        Ok(versions) => println!("  ℹ️  Versions: {}", versions),
        Err(e) => println!("  ⚠️  Versions unavailable: {}", e),
    }
    if let Err(e) = driver.disconnect().await {
        println!("  ⚠️  Disconnect failed: {}", e);
    }
    true
}

async fn check_port(config: &AppConfig) -> bool {
    print!("Checking port {}... ", config.server.port);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    match tokio::net::TcpListener::bind(&addr).await {
        Ok(_) => {
            println!("✅ Available");
            true
        }
        Err(e) => {
            println!("❌ Cannot bind {}: {}", addr, e);
            false
        }
    }
}
