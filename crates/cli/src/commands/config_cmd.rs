//! `cadence config` — Configuration management commands.

use cadence_config::AppConfig;

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();
            if config.agent.max_tokens.is_none() {
                warnings.push("No agent.max_tokens budget set; runs are bounded by iterations only");
            }
            if config.permissions.session_override {
                warnings.push("permissions.session_override is on; MEDIUM-risk tools run without asking");
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Max iterations:  {}", config.agent.max_iterations);
            println!("   Cache entries:   {}", config.cache.max_size);
            println!("   Default TTL:     {}s", config.cache.default_ttl_secs);
            println!("   Log level:       {}", config.logging.level);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.to_toml());
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config_path().display());
    Ok(())
}

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(());
    }

    std::fs::create_dir_all(AppConfig::config_dir())?;
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default config: {}", path.display());
    Ok(())
}
